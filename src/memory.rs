use crate::adapter::{
    DeleteReport, ExecutionAdapter, GroupedResult, InsertReport, RunOutput, WriteReport,
};
use crate::document::Document;
use crate::errors::QueryError;
use crate::query::eval::{MAX_LIMIT, MAX_SORT_FIELDS, compare_bson, get_path, project_fields};
use crate::query::{AggregateFn, AggregateSpec, Direction, Pipeline, SortKey, Stage, Transform};
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use parking_lot::RwLock;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Reference execution adapter over in-memory, insertion-ordered
/// collections. Stages run in the order the assembler emitted them; the
/// index flag on sort keys is accepted as a hint and ignored, since there
/// are no secondary indexes here.
#[derive(Default)]
pub struct MemoryAdapter {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_collection(&self, name: &str) {
        self.collections.write().entry(name.to_string()).or_default();
    }

    /// Test/bootstrap convenience: inserts the records and returns the keys.
    pub fn seed(&self, name: &str, records: Vec<BsonDocument>) -> Vec<DocumentId> {
        let mut rows = Vec::with_capacity(records.len());
        let mut keys = Vec::with_capacity(records.len());
        for data in records {
            let doc = Document::new(data);
            keys.push(doc.id.clone());
            rows.push(doc);
        }
        self.collections.write().entry(name.to_string()).or_default().extend(rows);
        keys
    }

    /// Current contents of a collection, in insertion order.
    #[must_use]
    pub fn snapshot(&self, name: &str) -> Vec<Document> {
        self.collections.read().get(name).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, name: &str) -> usize {
        self.collections.read().get(name).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self, name: &str) -> bool {
        self.len(name) == 0
    }
}

impl ExecutionAdapter for MemoryAdapter {
    fn run(&self, collection: &str, pipeline: &Pipeline) -> Result<RunOutput, QueryError> {
        let mut rows: Vec<Document> = {
            let cols = self.collections.read();
            cols.get(collection)
                .ok_or_else(|| QueryError::NoSuchCollection(collection.to_string()))?
                .clone()
        };
        let mut grouped = false;
        let mut scalar: Option<Bson> = None;
        for stage in &pipeline.stages {
            match stage {
                Stage::Filter(p) => rows.retain(|d| p.matches(&d.data)),
                Stage::Distinct { index } => rows = distinct_rows(rows, index.as_deref()),
                Stage::Group { column } => {
                    rows = group_first(rows, column);
                    grouped = true;
                }
                Stage::OrderBy(keys) => rows.sort_by(|a, b| compare_by_keys(&a.data, &b.data, keys)),
                Stage::Skip(n) => {
                    rows = if *n >= rows.len() { Vec::new() } else { rows.split_off(*n) };
                }
                Stage::Limit(n) => rows.truncate((*n).min(MAX_LIMIT)),
                Stage::Project(fields) => {
                    for d in &mut rows {
                        d.data = project_fields(&d.data, fields);
                    }
                }
                Stage::Aggregate(spec) => scalar = Some(aggregate_rows(&rows, spec)),
            }
        }
        log::debug!(
            "{}",
            json!({
                "op": "run",
                "collection": collection,
                "stages": pipeline.stages.len(),
                "grouped": grouped,
                "result_count": rows.len(),
            })
        );
        Ok(match scalar {
            Some(s) => RunOutput::Scalar(s),
            None if grouped => RunOutput::Grouped(GroupedResult { data: rows }),
            None => RunOutput::Records(rows),
        })
    }

    fn insert(
        &self,
        collection: &str,
        records: Vec<BsonDocument>,
    ) -> Result<InsertReport, QueryError> {
        let mut cols = self.collections.write();
        let rows = cols.entry(collection.to_string()).or_default();
        let mut report = InsertReport::default();
        for data in records {
            if let Some(id) = data.get("id") {
                let clash = rows.iter().any(|d| d.data.get("id") == Some(id));
                if clash {
                    log::warn!("duplicate primary key in `{collection}`: {id}");
                    report.errors += 1;
                    continue;
                }
                rows.push(Document::new(data));
            } else {
                let doc = Document::new(data);
                report.generated_keys.push(doc.id.clone());
                rows.push(doc);
            }
        }
        log::debug!(
            "{}",
            json!({
                "op": "insert",
                "collection": collection,
                "errors": report.errors,
                "generated": report.generated_keys.len(),
            })
        );
        Ok(report)
    }

    fn update(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        transform: &Transform,
    ) -> Result<WriteReport, QueryError> {
        let mut cols = self.collections.write();
        let rows = cols
            .get_mut(collection)
            .ok_or_else(|| QueryError::NoSuchCollection(collection.to_string()))?;
        let filter = pipeline.filter();
        let mut report = WriteReport::default();
        for d in rows.iter_mut() {
            if filter.is_none_or(|p| p.matches(&d.data)) {
                match transform.apply(&mut d.data) {
                    Ok(true) => report.replaced += 1,
                    Ok(false) => {}
                    Err(e) => {
                        log::warn!("update row failed in `{collection}`: {e}");
                        report.errors += 1;
                    }
                }
            }
        }
        log::debug!(
            "{}",
            json!({
                "op": "update",
                "collection": collection,
                "errors": report.errors,
                "replaced": report.replaced,
            })
        );
        Ok(report)
    }

    fn delete(&self, collection: &str, pipeline: &Pipeline) -> Result<DeleteReport, QueryError> {
        let mut cols = self.collections.write();
        let rows = cols
            .get_mut(collection)
            .ok_or_else(|| QueryError::NoSuchCollection(collection.to_string()))?;
        let filter = pipeline.filter();
        let before = rows.len();
        rows.retain(|d| filter.is_some_and(|p| !p.matches(&d.data)));
        let deleted = (before - rows.len()) as u64;
        log::debug!(
            "{}",
            json!({ "op": "delete", "collection": collection, "deleted": deleted })
        );
        Ok(DeleteReport { errors: 0, deleted })
    }
}

fn compare_by_keys(a: &BsonDocument, b: &BsonDocument, keys: &[SortKey]) -> Ordering {
    for key in keys.iter().take(MAX_SORT_FIELDS) {
        let va = get_path(a, &key.column);
        let vb = get_path(b, &key.column);
        let ord = match (va, vb) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if matches!(key.direction, Direction::Asc) { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

fn distinct_rows(rows: Vec<Document>, index: Option<&str>) -> Vec<Document> {
    match index {
        // Distinct by field value, first occurrence wins.
        Some(column) => first_per_key(rows, column),
        None => {
            let mut seen: Vec<BsonDocument> = Vec::new();
            let mut out = Vec::new();
            for d in rows {
                if !seen.contains(&d.data) {
                    seen.push(d.data.clone());
                    out.push(d);
                }
            }
            out
        }
    }
}

/// Partition by column, reduce each partition to its first member in input
/// order, flatten back out. This is distinct-by-column via first
/// occurrence, not a full GROUP BY.
fn group_first(rows: Vec<Document>, column: &str) -> Vec<Document> {
    first_per_key(rows, column)
}

fn first_per_key(rows: Vec<Document>, column: &str) -> Vec<Document> {
    let mut seen: Vec<Option<Bson>> = Vec::new();
    let mut out = Vec::new();
    for d in rows {
        let key = get_path(&d.data, column).cloned();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(d);
        }
    }
    out
}

fn aggregate_rows(rows: &[Document], spec: &AggregateSpec) -> Bson {
    let column = spec.column.as_deref();
    let values = || {
        rows.iter().filter_map(move |d| column.and_then(|c| get_path(&d.data, c)))
    };
    match spec.function {
        AggregateFn::Count => Bson::Int64(rows.len() as i64),
        AggregateFn::Sum => {
            let mut int_sum: i64 = 0;
            let mut float_sum = 0.0f64;
            let mut any_float = false;
            for v in values() {
                match v {
                    Bson::Int32(i) => int_sum += i64::from(*i),
                    Bson::Int64(i) => int_sum += *i,
                    Bson::Double(f) => {
                        any_float = true;
                        float_sum += *f;
                    }
                    _ => {}
                }
            }
            if any_float { Bson::Double(float_sum + int_sum as f64) } else { Bson::Int64(int_sum) }
        }
        AggregateFn::Min => {
            values().min_by(|a, b| compare_bson(a, b)).cloned().unwrap_or(Bson::Null)
        }
        AggregateFn::Max => {
            values().max_by(|a, b| compare_bson(a, b)).cloned().unwrap_or(Bson::Null)
        }
        AggregateFn::Avg => {
            let mut sum = 0.0f64;
            let mut n = 0usize;
            for v in values() {
                if let Some(f) = crate::query::eval::as_f64(v) {
                    sum += f;
                    n += 1;
                }
            }
            if n == 0 { Bson::Null } else { Bson::Double(sum / n as f64) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn delete_without_filter_stage_removes_every_record() {
        let adapter = MemoryAdapter::new();
        adapter.seed("t", vec![doc! {"x": 1}, doc! {"x": 2}]);
        let report = adapter.delete("t", &Pipeline::default()).unwrap();
        assert_eq!(report.deleted, 2);
        assert!(adapter.is_empty("t"));
    }

    #[test]
    fn insert_reports_duplicate_primary_keys_softly() {
        let adapter = MemoryAdapter::new();
        adapter.seed("t", vec![doc! {"id": 1, "x": 1}]);
        let report = adapter
            .insert("t", vec![doc! {"id": 1, "x": 2}, doc! {"id": 2, "x": 3}])
            .unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(adapter.len("t"), 2);
    }
}
