use thiserror::Error;

/// Crate-wide error type.
///
/// Configuration errors are raised while compiling the accumulated query
/// state, before the adapter performs any I/O. Execution errors come from
/// the adapter and are propagated unchanged. Mutation rows that fail softly
/// are counted in the write reports, not surfaced here.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid operand for `{operator}`: {reason}")]
    InvalidOperand { operator: &'static str, reason: String },

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("delete without conditions; use truncate()")]
    UnboundedDelete,

    #[error("aggregates over grouped queries are not supported")]
    GroupedAggregate,

    #[error("aggregate `{0}` requires a column")]
    MissingAggregateColumn(&'static str),

    #[error("scalar result where records were expected")]
    UnexpectedScalar,

    #[error("Collection not found: {0}")]
    NoSuchCollection(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("execution error: {0}")]
    Exec(String),
}

impl QueryError {
    /// True for errors raised at compile time, before any I/O.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperand { .. }
                | Self::Pattern(_)
                | Self::UnboundedDelete
                | Self::GroupedAggregate
                | Self::MissingAggregateColumn(_)
        )
    }
}
