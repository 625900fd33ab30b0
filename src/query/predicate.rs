use bson::{Bson, Document as BsonDocument};
use std::fmt;
use std::sync::Arc;

use crate::errors::QueryError;

use super::condition::{Condition, Join, Operand, Operator, RawPredicate, integer_operand};
use super::eval::{
    MAX_IN_SET, as_i64, compare_bson, contains_all, get_path, like_to_regex, string_form, type_tag,
};

type Matcher = Box<dyn Fn(&BsonDocument) -> bool + Send + Sync>;

/// Compiled boolean predicate over one record. Captures no external
/// handles, so a compiled value can cross a thread boundary as-is.
#[derive(Clone)]
pub struct Predicate {
    f: Arc<dyn Fn(&BsonDocument) -> bool + Send + Sync>,
}

impl Predicate {
    #[must_use]
    pub fn matches(&self, doc: &BsonDocument) -> bool {
        (*self.f)(doc)
    }

    /// The constant-true predicate an empty condition list compiles to.
    #[must_use]
    pub fn always() -> Self {
        Self { f: Arc::new(|_| true) }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate")
    }
}

/// Compiles an ordered condition list into a single predicate.
///
/// The fold is left-associative in insertion order: each condition's
/// single-condition matcher (negated first when `negate` is set) combines
/// with the accumulator via its own join connector. `[A and, B or, C and]`
/// therefore compiles to `((A or B) and C)`; there is no operator
/// precedence.
pub fn compile(conditions: &[Condition]) -> Result<Predicate, QueryError> {
    let mut acc: Option<Matcher> = None;
    for cond in conditions {
        cond.validate()?;
        let single = condition_matcher(cond)?;
        let single: Matcher =
            if cond.negate { Box::new(move |doc| !single(doc)) } else { single };
        acc = Some(match acc {
            None => single,
            Some(prev) => match cond.join {
                Join::And => Box::new(move |doc| prev(doc) && single(doc)),
                Join::Or => Box::new(move |doc| prev(doc) || single(doc)),
            },
        });
    }
    log::debug!("compiled predicate from {} condition(s)", conditions.len());
    Ok(acc.map_or_else(Predicate::always, |f| Predicate { f: Arc::from(f) }))
}

/// Per-operator translation. A field absent on a record never errors: it
/// fails every positive test except `exists`-negation, and is excluded
/// from ordering comparisons and ranges.
fn condition_matcher(cond: &Condition) -> Result<Matcher, QueryError> {
    let column = cond.column.clone();
    Ok(match cond.operator {
        Operator::Eq => {
            let value = value_operand(cond)?;
            Box::new(move |doc| get_path(doc, &column) == Some(&value))
        }
        Operator::Ne => {
            let value = value_operand(cond)?;
            Box::new(move |doc| get_path(doc, &column) != Some(&value))
        }
        Operator::Lt => ordering_matcher(column, value_operand(cond)?, |o| o == std::cmp::Ordering::Less),
        Operator::Gt => {
            ordering_matcher(column, value_operand(cond)?, |o| o == std::cmp::Ordering::Greater)
        }
        Operator::Lte => {
            ordering_matcher(column, value_operand(cond)?, |o| o != std::cmp::Ordering::Greater)
        }
        Operator::Gte => {
            ordering_matcher(column, value_operand(cond)?, |o| o != std::cmp::Ordering::Less)
        }
        Operator::Like => pattern_matcher(cond, &column, false, false)?,
        Operator::NotLike => pattern_matcher(cond, &column, false, true)?,
        Operator::Ilike => pattern_matcher(cond, &column, true, false)?,
        Operator::Between | Operator::NotBetween => {
            let (lo, hi) = pair_operand(cond)?;
            let invert = cond.operator == Operator::NotBetween;
            // Inclusive on both bounds; a record missing the column never
            // falls inside the range.
            Box::new(move |doc| {
                let inside = get_path(doc, &column).is_some_and(|v| {
                    compare_bson(v, &lo) != std::cmp::Ordering::Less
                        && compare_bson(v, &hi) != std::cmp::Ordering::Greater
                });
                inside != invert
            })
        }
        Operator::In | Operator::NotIn => {
            let values = set_operand(cond)?;
            let invert = cond.operator == Operator::NotIn;
            // The empty-set tautologies are fixed here, not left to the
            // backing store: `in []` matches nothing, `not_in []` matches
            // everything.
            if values.is_empty() {
                Box::new(move |_| invert)
            } else {
                let values: Vec<Bson> = values.into_iter().take(MAX_IN_SET).collect();
                Box::new(move |doc| {
                    let hit = get_path(doc, &column).is_some_and(|v| values.contains(v));
                    hit != invert
                })
            }
        }
        Operator::Regexp => regex_matcher(cond, &column, false)?,
        Operator::NotRegexp => regex_matcher(cond, &column, true)?,
        Operator::BitAnd => bitwise_matcher(column, shift_operand(cond)?, |f, v| f & v),
        Operator::BitOr => bitwise_matcher(column, shift_operand(cond)?, |f, v| f | v),
        Operator::BitXor => bitwise_matcher(column, shift_operand(cond)?, |f, v| f ^ v),
        Operator::ShiftLeft => bitwise_matcher(column, shift_operand(cond)?, |f, v| {
            u32::try_from(v).ok().and_then(|s| f.checked_shl(s)).unwrap_or(0)
        }),
        Operator::ShiftRight => bitwise_matcher(column, shift_operand(cond)?, |f, v| {
            u32::try_from(v).ok().and_then(|s| f.checked_shr(s)).unwrap_or(0)
        }),
        Operator::Contains => {
            let needles = match value_operand(cond)? {
                Bson::Array(vs) => vs,
                v => vec![v],
            };
            Box::new(move |doc| match get_path(doc, &column) {
                Some(Bson::Array(hay)) => contains_all(hay, &needles),
                _ => false,
            })
        }
        Operator::Exists => Box::new(move |doc| get_path(doc, &column).is_some()),
        Operator::Type => {
            let tag = match value_operand(cond)? {
                Bson::String(s) => s,
                _ => unreachable!("validated"),
            };
            Box::new(move |doc| {
                get_path(doc, &column).is_some_and(|v| type_tag(v).eq_ignore_ascii_case(&tag))
            })
        }
        Operator::Mod => {
            let (divisor, remainder) = pair_operand(cond)?;
            let divisor = integer_operand(&divisor)
                .ok_or_else(|| invalid(cond, "divisor must be an integer"))?;
            let remainder = integer_operand(&remainder)
                .ok_or_else(|| invalid(cond, "remainder must be an integer"))?;
            Box::new(move |doc| {
                get_path(doc, &column)
                    .and_then(as_i64)
                    .is_some_and(|f| f.rem_euclid(divisor) == remainder)
            })
        }
        Operator::Size => {
            let len = shift_operand(cond)?;
            Box::new(move |doc| match get_path(doc, &column) {
                Some(Bson::Array(vs)) => i64::try_from(vs.len()).is_ok_and(|n| n == len),
                _ => false,
            })
        }
        Operator::Raw => {
            let raw: RawPredicate = match &cond.operand {
                Operand::Predicate(p) => p.clone(),
                _ => return Err(invalid(cond, "expected a predicate closure")),
            };
            Box::new(move |doc| raw.matches(doc))
        }
    })
}

fn ordering_matcher(
    column: String,
    value: Bson,
    accept: fn(std::cmp::Ordering) -> bool,
) -> Matcher {
    Box::new(move |doc| {
        get_path(doc, &column).is_some_and(|v| accept(compare_bson(v, &value)))
    })
}

fn bitwise_matcher(column: String, operand: i64, apply: fn(i64, i64) -> i64) -> Matcher {
    Box::new(move |doc| {
        get_path(doc, &column).and_then(as_i64).is_some_and(|f| apply(f, operand) != 0)
    })
}

fn pattern_matcher(
    cond: &Condition,
    column: &str,
    case_insensitive: bool,
    invert: bool,
) -> Result<Matcher, QueryError> {
    let pattern = string_operand(cond)?;
    let re = like_to_regex(&pattern, case_insensitive)?;
    let column = column.to_string();
    Ok(Box::new(move |doc| {
        let hit = get_path(doc, &column)
            .and_then(string_form)
            .is_some_and(|s| re.is_match(&s));
        hit != invert
    }))
}

fn regex_matcher(cond: &Condition, column: &str, invert: bool) -> Result<Matcher, QueryError> {
    let pattern = string_operand(cond)?;
    let re = regex::Regex::new(&pattern)?;
    let column = column.to_string();
    Ok(Box::new(move |doc| {
        let hit = get_path(doc, &column)
            .and_then(string_form)
            .is_some_and(|s| re.is_match(&s));
        hit != invert
    }))
}

fn invalid(cond: &Condition, reason: &str) -> QueryError {
    QueryError::InvalidOperand { operator: cond.operator.name(), reason: reason.to_string() }
}

fn value_operand(cond: &Condition) -> Result<Bson, QueryError> {
    match &cond.operand {
        Operand::Value(v) => Ok(v.clone()),
        _ => Err(invalid(cond, "expected a single value")),
    }
}

fn string_operand(cond: &Condition) -> Result<String, QueryError> {
    match &cond.operand {
        Operand::Value(Bson::String(s)) => Ok(s.clone()),
        _ => Err(invalid(cond, "expected a string pattern")),
    }
}

fn pair_operand(cond: &Condition) -> Result<(Bson, Bson), QueryError> {
    match &cond.operand {
        Operand::Pair(a, b) => Ok((a.clone(), b.clone())),
        _ => Err(invalid(cond, "expected a 2-element ordered pair")),
    }
}

fn set_operand(cond: &Condition) -> Result<Vec<Bson>, QueryError> {
    match &cond.operand {
        Operand::Set(vs) => Ok(vs.clone()),
        _ => Err(invalid(cond, "expected an ordered sequence")),
    }
}

fn shift_operand(cond: &Condition) -> Result<i64, QueryError> {
    match &cond.operand {
        Operand::Value(v) => {
            integer_operand(v).ok_or_else(|| invalid(cond, "expected an integer"))
        }
        _ => Err(invalid(cond, "expected an integer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn cond(column: &str, op: Operator, operand: Operand) -> Condition {
        Condition::new(column, op, operand)
    }

    #[test]
    fn empty_conditions_compile_to_constant_true() {
        let p = compile(&[]).unwrap();
        assert!(p.matches(&doc! {}));
        assert!(p.matches(&doc! {"x": 1}));
    }

    #[test]
    fn missing_field_never_matches_an_inequality() {
        let p = compile(&[cond("age", Operator::Gt, Operand::Value(Bson::Int32(10)))]).unwrap();
        assert!(!p.matches(&doc! {"name": "alice"}));
        let p = compile(&[cond("age", Operator::Lte, Operand::Value(Bson::Int32(10)))]).unwrap();
        assert!(!p.matches(&doc! {"name": "alice"}));
    }

    #[test]
    fn missing_field_is_unequal_to_everything() {
        let eq = compile(&[cond("age", Operator::Eq, Operand::Value(Bson::Int32(10)))]).unwrap();
        assert!(!eq.matches(&doc! {}));
        let ne = compile(&[cond("age", Operator::Ne, Operand::Value(Bson::Int32(10)))]).unwrap();
        assert!(ne.matches(&doc! {}));
    }

    #[test]
    fn malformed_between_is_a_compile_time_error() {
        let err = compile(&[cond("age", Operator::Between, Operand::Value(Bson::Int32(1)))])
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn invalid_regex_is_a_compile_time_error() {
        let err = compile(&[cond("s", Operator::Regexp, Operand::Value(Bson::String("(".into())))])
            .unwrap_err();
        assert!(matches!(err, QueryError::Pattern(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn fold_is_left_associative() {
        // [A and, B or, C and] == ((A or B) and C)
        let conds = vec![
            cond("a", Operator::Eq, Operand::Value(Bson::Int32(1))),
            cond("b", Operator::Eq, Operand::Value(Bson::Int32(1))).with_join(Join::Or),
            cond("c", Operator::Eq, Operand::Value(Bson::Int32(1))),
        ];
        let p = compile(&conds).unwrap();
        // A false, B true, C true => (false or true) and true => true
        assert!(p.matches(&doc! {"a": 0, "b": 1, "c": 1}));
        // A true, B false, C false => (true or false) and false => false;
        // the right-associative reading A or (B and C) would accept it.
        assert!(!p.matches(&doc! {"a": 1, "b": 0, "c": 0}));
    }
}
