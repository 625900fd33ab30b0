use bson::{Bson, Document as BsonDocument};
use std::fmt;

/// A row-level failure while applying a transform. Counted in the write
/// report, never raised as a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyError(pub String);

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record transform applied to every record matched by the filter stage.
#[derive(Debug, Clone)]
pub enum Transform {
    /// Shallow key merge of the given values into the record.
    Merge(BsonDocument),
    /// Array append, or keyed-mapping merge when `value` is a document and
    /// `unique` is set.
    Push { column: String, value: Bson, unique: bool },
    /// Removes every occurrence of the given values from an array field.
    Pull { column: String, values: Vec<Bson> },
    /// Removes the named fields entirely (not set to null).
    Without(Vec<String>),
}

impl Transform {
    /// A scalar pull value is normalized into a single-element set before
    /// differencing.
    #[must_use]
    pub fn pull(column: impl Into<String>, value: Bson) -> Self {
        let values = match value {
            Bson::Array(vs) => vs,
            v => vec![v],
        };
        Self::Pull { column: column.into(), values }
    }

    /// Applies the transform to one record. `Ok(true)` when the record
    /// changed.
    pub fn apply(&self, doc: &mut BsonDocument) -> Result<bool, ApplyError> {
        match self {
            Self::Merge(values) => {
                let mut changed = false;
                for (k, v) in values {
                    if set_path(doc, k, v.clone()) {
                        changed = true;
                    }
                }
                Ok(changed)
            }
            Self::Push { column, value, unique } => apply_push(doc, column, value, *unique),
            Self::Pull { column, values } => apply_pull(doc, column, values),
            Self::Without(columns) => {
                let mut changed = false;
                for column in columns {
                    if unset_path(doc, column) {
                        changed = true;
                    }
                }
                Ok(changed)
            }
        }
    }
}

fn apply_push(
    doc: &mut BsonDocument,
    column: &str,
    value: &Bson,
    unique: bool,
) -> Result<bool, ApplyError> {
    // A keyed mapping with unique=true merges into the target mapping;
    // every other shape appends to the array at `column`.
    if let Bson::Document(patch) = value
        && unique
    {
        return match get_path(doc, column) {
            Some(Bson::Document(mut target)) => {
                let mut changed = false;
                for (k, v) in patch {
                    if target.insert(k.clone(), v.clone()) != Some(v.clone()) {
                        changed = true;
                    }
                }
                set_path(doc, column, Bson::Document(target));
                Ok(changed)
            }
            None => {
                set_path(doc, column, Bson::Document(patch.clone()));
                Ok(true)
            }
            Some(other) => Err(ApplyError(format!(
                "cannot merge into non-object field `{column}` of type {}",
                super::eval::type_tag(&other)
            ))),
        };
    }

    let additions: Vec<Bson> = match value {
        Bson::Array(vs) => vs.clone(),
        v => vec![v.clone()],
    };
    // The field defaults to an empty array when absent.
    let mut target = match get_path(doc, column) {
        Some(Bson::Array(vs)) => vs,
        None | Some(Bson::Null) => Vec::new(),
        Some(other) => {
            return Err(ApplyError(format!(
                "cannot append to non-array field `{column}` of type {}",
                super::eval::type_tag(&other)
            )));
        }
    };
    let before = target.clone();
    if unique {
        // Subtract already-present elements first so the result holds no
        // duplicate of the newly added ones.
        target.retain(|existing| !additions.contains(existing));
    }
    target.extend(additions);
    let changed = target != before;
    set_path(doc, column, Bson::Array(target));
    Ok(changed)
}

fn apply_pull(doc: &mut BsonDocument, column: &str, values: &[Bson]) -> Result<bool, ApplyError> {
    match get_path(doc, column) {
        Some(Bson::Array(mut target)) => {
            let before = target.len();
            target.retain(|existing| !values.contains(existing));
            let changed = target.len() != before;
            set_path(doc, column, Bson::Array(target));
            Ok(changed)
        }
        Some(other) => Err(ApplyError(format!(
            "cannot difference non-array field `{column}` of type {}",
            super::eval::type_tag(&other)
        ))),
        None => Err(ApplyError(format!("no attribute `{column}` in record"))),
    }
}

fn ensure_subdoc<'a>(root: &'a mut BsonDocument, key: &str) -> &'a mut BsonDocument {
    let needs_new = !matches!(root.get(key), Some(Bson::Document(_)));
    if needs_new {
        root.insert(key.to_string(), Bson::Document(BsonDocument::new()));
    }
    match root.get_mut(key) {
        Some(Bson::Document(d)) => d,
        _ => unreachable!(),
    }
}

fn traverse_to_parent<'a>(root: &'a mut BsonDocument, path: &str) -> (&'a mut BsonDocument, String) {
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    let mut last = String::new();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            last = seg.to_string();
            break;
        }
        cur = ensure_subdoc(cur, seg);
    }
    (cur, last)
}

fn set_path(root: &mut BsonDocument, path: &str, value: Bson) -> bool {
    let (parent, last) = traverse_to_parent(root, path);
    let old = parent.insert(last, value.clone());
    old.as_ref() != Some(&value)
}

fn unset_path(root: &mut BsonDocument, path: &str) -> bool {
    // Dotted paths walk into nested documents; missing fields are a no-op.
    let mut cur = root;
    let mut iter = path.split('.').peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return cur.remove(seg).is_some();
        }
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    false
}

fn get_path(root: &BsonDocument, path: &str) -> Option<Bson> {
    super::eval::get_path(root, path).cloned()
}
