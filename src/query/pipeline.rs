use serde::{Deserialize, Serialize};

use crate::errors::QueryError;

use super::condition::Direction;
use super::eval::{MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS};
use super::predicate::Predicate;

/// One non-filter query shaping instruction, kept in call order until
/// assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Directive {
    Order { column: String, direction: Direction, index: bool },
    Group { column: String },
    Skip(usize),
    Limit(usize),
    Distinct { index: Option<String> },
    Project(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFn {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
        }
    }
}

/// At most one aggregate is active per compiled query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub function: AggregateFn,
    pub column: Option<String>,
}

/// One sort key. `index` marks a declared secondary index; the stage then
/// carries the hint so an adapter can choose an index-scan path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    pub direction: Direction,
    pub index: bool,
}

/// One step of the compiled execution pipeline.
#[derive(Debug, Clone)]
pub enum Stage {
    Filter(Predicate),
    Distinct { index: Option<String> },
    Group { column: String },
    OrderBy(Vec<SortKey>),
    Skip(usize),
    Limit(usize),
    Project(Vec<String>),
    Aggregate(AggregateSpec),
}

/// Ordered stage list handed to the execution adapter.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    #[must_use]
    pub fn has_group(&self) -> bool {
        self.stages.iter().any(|s| matches!(s, Stage::Group { .. }))
    }

    /// The filter predicate, when one condition or more was accumulated.
    #[must_use]
    pub fn filter(&self) -> Option<&Predicate> {
        self.stages.iter().find_map(|s| match s {
            Stage::Filter(p) => Some(p),
            _ => None,
        })
    }
}

/// Assembles directives into stages in a fixed order:
/// filter → distinct → group → order → skip → limit → project → aggregate.
///
/// The order is a contract, not an accident: directives may be accumulated
/// in any call order and still produce the same deterministic pipeline.
/// Later `skip`/`limit`/`project` directives override earlier ones; every
/// `group` directive contributes a stage in declaration order; all `order`
/// directives collapse into one stable multi-key sort.
///
/// Aggregates over a grouped pipeline are a flagged limitation (the
/// ungrouped path is the guaranteed-correct one) and fail compilation.
pub fn assemble(
    filter: Option<Predicate>,
    directives: &[Directive],
    aggregate: Option<&AggregateSpec>,
) -> Result<Pipeline, QueryError> {
    let mut distinct: Option<Option<String>> = None;
    let mut groups: Vec<String> = Vec::new();
    let mut sort_keys: Vec<SortKey> = Vec::new();
    let mut skip: Option<usize> = None;
    let mut limit: Option<usize> = None;
    let mut projection: Option<Vec<String>> = None;

    for directive in directives {
        match directive {
            Directive::Order { column, direction, index } => {
                sort_keys.push(SortKey {
                    column: column.clone(),
                    direction: *direction,
                    index: *index,
                });
            }
            Directive::Group { column } => groups.push(column.clone()),
            Directive::Skip(n) => skip = Some(*n),
            Directive::Limit(n) => limit = Some(*n),
            Directive::Distinct { index } => distinct = Some(index.clone()),
            Directive::Project(columns) => projection = Some(columns.clone()),
        }
    }

    if let Some(spec) = aggregate {
        if !groups.is_empty() {
            return Err(QueryError::GroupedAggregate);
        }
        if spec.column.is_none() && spec.function != AggregateFn::Count {
            return Err(QueryError::MissingAggregateColumn(spec.function.name()));
        }
    }

    if sort_keys.len() > MAX_SORT_FIELDS {
        log::warn!("sort spec too long: {}", sort_keys.len());
        sort_keys.truncate(MAX_SORT_FIELDS);
    }
    if let Some(fields) = &mut projection
        && fields.len() > MAX_PROJECTION_FIELDS
    {
        log::warn!("projection too wide: {}", fields.len());
        fields.truncate(MAX_PROJECTION_FIELDS);
    }

    let mut stages = Vec::new();
    if let Some(p) = filter {
        stages.push(Stage::Filter(p));
    }
    if let Some(index) = distinct {
        stages.push(Stage::Distinct { index });
    }
    for column in groups {
        stages.push(Stage::Group { column });
    }
    if !sort_keys.is_empty() {
        stages.push(Stage::OrderBy(sort_keys));
    }
    if let Some(n) = skip {
        stages.push(Stage::Skip(n));
    }
    if let Some(n) = limit {
        stages.push(Stage::Limit(n));
    }
    if let Some(fields) = projection {
        stages.push(Stage::Project(fields));
    }
    if let Some(spec) = aggregate {
        stages.push(Stage::Aggregate(spec.clone()));
    }
    Ok(Pipeline { stages })
}
