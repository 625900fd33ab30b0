use crate::errors::QueryError;
use bson::{Bson, Document as BsonDocument};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// How a condition combines with the predicate accumulated so far.
/// The first condition's join is irrelevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Join {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

/// Closed set of filter operators. Anything the compiler cannot translate
/// is rejected at construction time, not at execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
    Ne,
    Like,
    NotLike,
    Ilike,
    Between,
    NotBetween,
    In,
    NotIn,
    Regexp,
    NotRegexp,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    Contains,
    Exists,
    Type,
    Mod,
    Size,
    Raw,
}

impl Operator {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Lte => "lte",
            Self::Gte => "gte",
            Self::Ne => "ne",
            Self::Like => "like",
            Self::NotLike => "not_like",
            Self::Ilike => "ilike",
            Self::Between => "between",
            Self::NotBetween => "not_between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Regexp => "regexp",
            Self::NotRegexp => "not_regexp",
            Self::BitAnd => "bitwise_and",
            Self::BitOr => "bitwise_or",
            Self::BitXor => "bitwise_xor",
            Self::ShiftLeft => "shift_left",
            Self::ShiftRight => "shift_right",
            Self::Contains => "contains",
            Self::Exists => "exists",
            Self::Type => "type",
            Self::Mod => "mod",
            Self::Size => "size",
            Self::Raw => "raw",
        }
    }
}

/// Caller-supplied predicate carried by the `raw` operator.
#[derive(Clone)]
pub struct RawPredicate(Arc<dyn Fn(&BsonDocument) -> bool + Send + Sync>);

impl RawPredicate {
    pub fn new(f: impl Fn(&BsonDocument) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn matches(&self, doc: &BsonDocument) -> bool {
        (*self.0)(doc)
    }
}

impl fmt::Debug for RawPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawPredicate")
    }
}

/// Operand attached to a condition. Sub-query operands are not supported;
/// the `raw` operator's closure covers those cases.
#[derive(Debug, Clone)]
pub enum Operand {
    None,
    Value(Bson),
    Pair(Bson, Bson),
    Set(Vec<Bson>),
    Predicate(RawPredicate),
}

/// One filter clause. Conditions are stored and compiled strictly in
/// insertion order.
#[derive(Debug, Clone)]
pub struct Condition {
    pub column: String,
    pub operator: Operator,
    pub operand: Operand,
    pub join: Join,
    pub negate: bool,
}

impl Condition {
    #[must_use]
    pub fn new(column: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Self { column: column.into(), operator, operand, join: Join::And, negate: false }
    }

    #[must_use]
    pub fn with_join(mut self, join: Join) -> Self {
        self.join = join;
        self
    }

    #[must_use]
    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    /// Checks the operand shape against the operator. Violations are
    /// configuration errors, raised before the backing store is touched.
    pub fn validate(&self) -> Result<(), QueryError> {
        let op = self.operator;
        match op {
            Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Gt
            | Operator::Lte
            | Operator::Gte
            | Operator::Contains => match self.operand {
                Operand::Value(_) => Ok(()),
                _ => Err(self.shape_error("expected a single value")),
            },
            Operator::Like | Operator::NotLike | Operator::Ilike | Operator::Regexp
            | Operator::NotRegexp => match self.operand {
                Operand::Value(Bson::String(_)) => Ok(()),
                _ => Err(self.shape_error("expected a string pattern")),
            },
            Operator::Between | Operator::NotBetween => match self.operand {
                Operand::Pair(_, _) => Ok(()),
                _ => Err(self.shape_error("expected a 2-element ordered pair")),
            },
            Operator::Mod => match &self.operand {
                Operand::Pair(divisor, _) => {
                    if integer_operand(divisor) == Some(0) {
                        Err(self.shape_error("divisor must be nonzero"))
                    } else if integer_operand(divisor).is_none() {
                        Err(self.shape_error("divisor must be an integer"))
                    } else {
                        Ok(())
                    }
                }
                _ => Err(self.shape_error("expected a [divisor, remainder] pair")),
            },
            Operator::In | Operator::NotIn => match self.operand {
                Operand::Set(_) => Ok(()),
                _ => Err(self.shape_error("expected an ordered sequence")),
            },
            Operator::Exists => match self.operand {
                Operand::None => Ok(()),
                _ => Err(self.shape_error("takes no operand")),
            },
            Operator::Type => match self.operand {
                Operand::Value(Bson::String(_)) => Ok(()),
                _ => Err(self.shape_error("expected a type tag")),
            },
            Operator::Size
            | Operator::BitAnd
            | Operator::BitOr
            | Operator::BitXor
            | Operator::ShiftLeft
            | Operator::ShiftRight => match &self.operand {
                Operand::Value(v) if integer_operand(v).is_some() => Ok(()),
                _ => Err(self.shape_error("expected an integer")),
            },
            Operator::Raw => match self.operand {
                Operand::Predicate(_) => Ok(()),
                _ => Err(self.shape_error("expected a predicate closure")),
            },
        }
    }

    fn shape_error(&self, reason: &str) -> QueryError {
        QueryError::InvalidOperand { operator: self.operator.name(), reason: reason.to_string() }
    }
}

pub(crate) fn integer_operand(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        _ => None,
    }
}
