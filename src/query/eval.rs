use bson::{Bson, Document as BsonDocument};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

// Safety limits to prevent resource abuse
pub const MAX_PATH_DEPTH: usize = 32;
pub const MAX_IN_SET: usize = 1000;
pub const MAX_SORT_FIELDS: usize = 8;
pub const MAX_PROJECTION_FIELDS: usize = 64;
pub const MAX_LIMIT: usize = 10_000;

/// Resolves a dotted field path against a document. A missing field is a
/// distinguished "absent" outcome, never an error.
pub fn get_path<'a>(doc: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut cur = doc;
    let mut segs = 0usize;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        segs += 1;
        if segs > MAX_PATH_DEPTH {
            return None;
        }
        if parts.peek().is_none() {
            return cur.get(part);
        }
        match cur.get(part) {
            Some(Bson::Document(d)) => cur = d,
            _ => return None,
        }
    }
    None
}

/// Total order over BSON values: numbers compare numerically across integer
/// and floating types, strings and booleans natively, everything else by
/// type rank.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::Null => 0,
        Bson::Boolean(_) => 1,
        Bson::Int32(_) => 2,
        Bson::Int64(_) => 3,
        Bson::Double(_) => 4,
        Bson::String(_) => 5,
        Bson::Array(_) => 6,
        Bson::Document(_) => 7,
        _ => 255,
    }
}

pub fn as_f64(v: &Bson) -> Option<f64> {
    match v {
        Bson::Int32(i) => Some(f64::from(*i)),
        Bson::Int64(i) => Some(*i as f64),
        Bson::Double(f) => Some(*f),
        Bson::Decimal128(d) => d.to_string().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn as_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(i64::from(*i)),
        Bson::Int64(i) => Some(*i),
        Bson::Double(f) if f.fract() == 0.0 && f.abs() < 9.0e18 => Some(*f as i64),
        _ => None,
    }
}

/// String form pattern operators are tested against.
pub fn string_form(v: &Bson) -> Option<String> {
    match v {
        Bson::String(s) => Some(s.clone()),
        Bson::Int32(i) => Some(i.to_string()),
        Bson::Int64(i) => Some(i.to_string()),
        Bson::Double(f) => Some(f.to_string()),
        Bson::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tag matched by the `type` operator, compared case-insensitively.
#[must_use]
pub fn type_tag(v: &Bson) -> &'static str {
    match v {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => "number",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        _ => "other",
    }
}

/// Translates a LIKE pattern into an anchored regular expression:
/// `%` matches any run of characters, `_` exactly one.
pub fn like_to_regex(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                translated.push_str(&regex::escape(&literal));
                literal.clear();
                translated.push_str(if ch == '%' { ".*" } else { "." });
            }
            c => literal.push(c),
        }
    }
    translated.push_str(&regex::escape(&literal));
    translated.push('$');
    RegexBuilder::new(&translated)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
}

pub fn contains_all(haystack: &[Bson], needles: &[Bson]) -> bool {
    needles.iter().all(|n| haystack.contains(n))
}

pub fn project_fields(doc: &BsonDocument, fields: &[String]) -> BsonDocument {
    let mut out = BsonDocument::new();
    for f in fields {
        if let Some(v) = doc.get(f) {
            out.insert(f.clone(), v.clone());
        }
    }
    out
}
