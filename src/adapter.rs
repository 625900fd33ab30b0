use crate::document::Document;
use crate::errors::QueryError;
use crate::query::{Pipeline, Transform};
use crate::types::DocumentId;
use bson::Bson;
use serde::{Deserialize, Serialize};

/// Tagged wrapper a grouped pipeline returns. Callers unwrap to `data`
/// before handing records back to the application layer.
#[derive(Debug, Clone, Default)]
pub struct GroupedResult {
    pub data: Vec<Document>,
}

/// Result of running a compiled pipeline.
#[derive(Debug, Clone)]
pub enum RunOutput {
    Records(Vec<Document>),
    Grouped(GroupedResult),
    Scalar(Bson),
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertReport {
    pub errors: u64,
    pub generated_keys: Vec<DocumentId>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    pub errors: u64,
    pub replaced: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub errors: u64,
    pub deleted: u64,
}

/// Backing-store boundary. Implementations execute a compiled pipeline or
/// mutation and perform all I/O; the compiler never retries or masks their
/// errors. Row-level mutation failures are soft: they land in the report
/// counters, not in `Err`.
pub trait ExecutionAdapter: Send + Sync {
    fn run(&self, collection: &str, pipeline: &Pipeline) -> Result<RunOutput, QueryError>;

    fn insert(
        &self,
        collection: &str,
        records: Vec<bson::Document>,
    ) -> Result<InsertReport, QueryError>;

    fn update(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        transform: &Transform,
    ) -> Result<WriteReport, QueryError>;

    fn delete(&self, collection: &str, pipeline: &Pipeline) -> Result<DeleteReport, QueryError>;
}
