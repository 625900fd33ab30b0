use bson::{Bson, Document as BsonDocument};
use std::sync::Arc;

use crate::adapter::{ExecutionAdapter, RunOutput};
use crate::document::Document;
use crate::errors::QueryError;
use crate::query::{
    AggregateFn, AggregateSpec, Condition, Direction, Directive, Join, Operand, Operator, Pipeline,
    Predicate, RawPredicate, Stage, Transform, assemble, compile,
};

/// Accumulated query state: conditions and directives in call order, plus
/// at most one aggregate. Mutable during accumulation; the compiler treats
/// it as immutable once an execution begins. Each execution recompiles from
/// the current state, so mutating between executions is expected.
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub conditions: Vec<Condition>,
    pub directives: Vec<Directive>,
    pub aggregate: Option<AggregateSpec>,
}

impl QueryState {
    /// Compiles the full pipeline for a record-returning query.
    pub fn compile(&self) -> Result<Pipeline, QueryError> {
        assemble(self.filter_predicate()?, &self.directives, self.aggregate.as_ref())
    }

    /// Compiles a filter-only pipeline, the form mutations execute against:
    /// shaping directives never affect which records a mutation targets.
    pub fn compile_filter(&self) -> Result<Pipeline, QueryError> {
        let stages = self.filter_predicate()?.map(Stage::Filter).into_iter().collect();
        Ok(Pipeline { stages })
    }

    fn compile_with_aggregate(&self, spec: &AggregateSpec) -> Result<Pipeline, QueryError> {
        // Aggregates reduce the filtered, optionally-distinct record set;
        // ordering and pagination directives do not apply. Group directives
        // are kept so a grouped aggregate still fails compilation.
        let shaping: Vec<Directive> = self
            .directives
            .iter()
            .filter(|d| matches!(d, Directive::Distinct { .. } | Directive::Group { .. }))
            .cloned()
            .collect();
        assemble(self.filter_predicate()?, &shaping, Some(spec))
    }

    fn filter_predicate(&self) -> Result<Option<Predicate>, QueryError> {
        if self.conditions.is_empty() { Ok(None) } else { Ok(Some(compile(&self.conditions)?)) }
    }
}

/// Query over one collection. A builder instance belongs to a single
/// logical call sequence: construct, accumulate, then compile-and-execute
/// through a terminal method. The compiled output captures no external
/// handles, so it crosses thread boundaries without further coordination.
pub struct Query<A: ExecutionAdapter> {
    adapter: Arc<A>,
    collection: String,
    state: QueryState,
}

impl<A: ExecutionAdapter> Query<A> {
    #[must_use]
    pub fn new(adapter: Arc<A>, collection: impl Into<String>) -> Self {
        Self { adapter, collection: collection.into(), state: QueryState::default() }
    }

    #[must_use]
    pub const fn state(&self) -> &QueryState {
        &self.state
    }

    // --- accumulation -----------------------------------------------------

    /// Narrow seam for a fluent layer composing over this builder.
    #[must_use]
    pub fn push_condition(mut self, condition: Condition) -> Self {
        self.state.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn push_directive(mut self, directive: Directive) -> Self {
        self.state.directives.push(directive);
        self
    }

    #[must_use]
    pub fn where_op(self, column: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        self.push_condition(Condition::new(column, operator, operand))
    }

    #[must_use]
    pub fn or_where(self, column: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        self.push_condition(Condition::new(column, operator, operand).with_join(Join::Or))
    }

    #[must_use]
    pub fn where_not(
        self,
        column: impl Into<String>,
        operator: Operator,
        operand: Operand,
    ) -> Self {
        self.push_condition(Condition::new(column, operator, operand).negated())
    }

    #[must_use]
    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.where_op(column, Operator::Eq, Operand::Value(value.into()))
    }

    #[must_use]
    pub fn where_between(
        self,
        column: impl Into<String>,
        low: impl Into<Bson>,
        high: impl Into<Bson>,
    ) -> Self {
        self.where_op(column, Operator::Between, Operand::Pair(low.into(), high.into()))
    }

    #[must_use]
    pub fn where_in(self, column: impl Into<String>, values: Vec<Bson>) -> Self {
        self.where_op(column, Operator::In, Operand::Set(values))
    }

    #[must_use]
    pub fn where_not_in(self, column: impl Into<String>, values: Vec<Bson>) -> Self {
        self.where_op(column, Operator::NotIn, Operand::Set(values))
    }

    #[must_use]
    pub fn where_exists(self, column: impl Into<String>) -> Self {
        self.where_op(column, Operator::Exists, Operand::None)
    }

    #[must_use]
    pub fn where_raw(
        self,
        f: impl Fn(&BsonDocument) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.where_op("", Operator::Raw, Operand::Predicate(RawPredicate::new(f)))
    }

    #[must_use]
    pub fn order_by(self, column: impl Into<String>, direction: Direction) -> Self {
        self.push_directive(Directive::Order { column: column.into(), direction, index: false })
    }

    /// Orders by a declared secondary index; the stage carries the hint so
    /// the adapter can choose an index-scan path.
    #[must_use]
    pub fn order_by_index(self, column: impl Into<String>, direction: Direction) -> Self {
        self.push_directive(Directive::Order { column: column.into(), direction, index: true })
    }

    #[must_use]
    pub fn group_by(self, column: impl Into<String>) -> Self {
        self.push_directive(Directive::Group { column: column.into() })
    }

    #[must_use]
    pub fn distinct(self) -> Self {
        self.push_directive(Directive::Distinct { index: None })
    }

    #[must_use]
    pub fn distinct_index(self, column: impl Into<String>) -> Self {
        self.push_directive(Directive::Distinct { index: Some(column.into()) })
    }

    #[must_use]
    pub fn skip(self, n: usize) -> Self {
        self.push_directive(Directive::Skip(n))
    }

    #[must_use]
    pub fn limit(self, n: usize) -> Self {
        self.push_directive(Directive::Limit(n))
    }

    #[must_use]
    pub fn project(self, columns: Vec<String>) -> Self {
        self.push_directive(Directive::Project(columns))
    }

    // --- terminals --------------------------------------------------------

    /// Runs the compiled pipeline and returns the matching records. A
    /// grouped result is unwrapped to its inner data sequence.
    pub fn get(&self) -> Result<Vec<Document>, QueryError> {
        let pipeline = self.state.compile()?;
        match self.adapter.run(&self.collection, &pipeline)? {
            RunOutput::Records(rows) => Ok(rows),
            RunOutput::Grouped(grouped) => Ok(grouped.data),
            RunOutput::Scalar(_) => Err(QueryError::UnexpectedScalar),
        }
    }

    pub fn count(&self) -> Result<u64, QueryError> {
        match self.run_aggregate(AggregateFn::Count, None)? {
            Bson::Int64(n) => Ok(u64::try_from(n).unwrap_or(0)),
            Bson::Int32(n) => Ok(u64::try_from(n).unwrap_or(0)),
            other => Err(QueryError::Exec(format!("non-integer count: {other}"))),
        }
    }

    /// Sum over the named column. An empty filtered set sums to integer
    /// zero.
    pub fn sum(&self, column: &str) -> Result<Bson, QueryError> {
        self.run_aggregate(AggregateFn::Sum, Some(column))
    }

    /// `None` when the filtered set is empty; never an error.
    pub fn min(&self, column: &str) -> Result<Option<Bson>, QueryError> {
        Ok(nullable(self.run_aggregate(AggregateFn::Min, Some(column))?))
    }

    pub fn max(&self, column: &str) -> Result<Option<Bson>, QueryError> {
        Ok(nullable(self.run_aggregate(AggregateFn::Max, Some(column))?))
    }

    pub fn avg(&self, column: &str) -> Result<Option<Bson>, QueryError> {
        Ok(nullable(self.run_aggregate(AggregateFn::Avg, Some(column))?))
    }

    /// Inserts records; `true` when no record failed.
    pub fn insert(&self, records: Vec<BsonDocument>) -> Result<bool, QueryError> {
        let report = self.adapter.insert(&self.collection, records)?;
        Ok(report.errors == 0)
    }

    /// Inserts one record and returns its key: an explicit `id` field wins,
    /// otherwise the first generated key. A soft failure yields `Null`.
    pub fn insert_get_id(&self, record: BsonDocument) -> Result<Bson, QueryError> {
        let explicit = record.get("id").cloned();
        let report = self.adapter.insert(&self.collection, vec![record])?;
        if report.errors != 0 {
            return Ok(Bson::Null);
        }
        Ok(match explicit {
            Some(id) => id,
            None => report
                .generated_keys
                .first()
                .map_or(Bson::Null, |k| Bson::String(k.to_string())),
        })
    }

    /// Merges the given values into every matched record and returns the
    /// replaced count, or zero when any row failed softly.
    pub fn update(&self, values: BsonDocument) -> Result<u64, QueryError> {
        let report = self.run_transform(&Transform::Merge(values))?;
        Ok(if report.errors == 0 { report.replaced } else { 0 })
    }

    /// Appends to (or merges into) the array/mapping at `column` on every
    /// matched record.
    pub fn push(&self, column: &str, value: impl Into<Bson>, unique: bool) -> Result<bool, QueryError> {
        let transform = Transform::Push { column: column.to_string(), value: value.into(), unique };
        Ok(self.run_transform(&transform)?.errors == 0)
    }

    /// Removes the value(s) from the array at `column` on every matched
    /// record.
    pub fn pull(&self, column: &str, value: impl Into<Bson>) -> Result<bool, QueryError> {
        let transform = Transform::pull(column, value.into());
        Ok(self.run_transform(&transform)?.errors == 0)
    }

    /// Removes the named fields entirely from every matched record.
    pub fn drop_fields(&self, columns: Vec<String>) -> Result<bool, QueryError> {
        Ok(self.run_transform(&Transform::Without(columns))?.errors == 0)
    }

    /// Deletes the matched records. A delete with no accumulated condition
    /// is a configuration error: truncate semantics are only reachable
    /// through [`Self::truncate`].
    pub fn delete(&self) -> Result<u64, QueryError> {
        if self.state.conditions.is_empty() {
            return Err(QueryError::UnboundedDelete);
        }
        let pipeline = self.state.compile_filter()?;
        let report = self.adapter.delete(&self.collection, &pipeline)?;
        Ok(report.deleted)
    }

    /// Deletes the record whose `id` field equals the given key.
    pub fn delete_by_id(self, id: impl Into<Bson>) -> Result<u64, QueryError> {
        self.where_eq("id", id).delete()
    }

    /// Removes every record in the collection. The only unconditioned
    /// delete path.
    pub fn truncate(&self) -> Result<bool, QueryError> {
        let report = self.adapter.delete(&self.collection, &Pipeline::default())?;
        Ok(report.errors == 0)
    }

    fn run_aggregate(
        &self,
        function: AggregateFn,
        column: Option<&str>,
    ) -> Result<Bson, QueryError> {
        let spec = AggregateSpec { function, column: column.map(str::to_string) };
        let pipeline = self.state.compile_with_aggregate(&spec)?;
        match self.adapter.run(&self.collection, &pipeline)? {
            RunOutput::Scalar(v) => Ok(v),
            _ => Err(QueryError::Exec(format!(
                "adapter returned records for aggregate `{}`",
                function.name()
            ))),
        }
    }

    fn run_transform(&self, transform: &Transform) -> Result<crate::adapter::WriteReport, QueryError> {
        let pipeline = self.state.compile_filter()?;
        self.adapter.update(&self.collection, &pipeline, transform)
    }
}

fn nullable(v: Bson) -> Option<Bson> {
    match v {
        Bson::Null => None,
        other => Some(other),
    }
}
