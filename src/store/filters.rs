//! Predicate filtering for snapshot evaluation
//!
//! Filters row documents strictly according to predicates.
//! No type coercion, exact match only. Missing and null fields never match.

use std::cmp::Ordering;

use serde_json::Value;

use super::predicate::{Condition, FilterOp, Predicate};

/// Evaluates predicates against row documents
pub struct PredicateFilter;

impl PredicateFilter {
    /// Checks if a document matches all conditions (AND semantics)
    pub fn matches(document: &Value, predicate: &Predicate) -> bool {
        predicate
            .conditions()
            .iter()
            .all(|condition| Self::matches_condition(document, condition))
    }

    fn matches_condition(document: &Value, condition: &Condition) -> bool {
        let field_value = match document.get(&condition.field) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };

        match &condition.op {
            FilterOp::Eq(expected) => Self::eq_match(field_value, expected),
            FilterOp::Gte(bound) => Self::compare(field_value, bound).map_or(false, Ordering::is_ge),
            FilterOp::Gt(bound) => Self::compare(field_value, bound).map_or(false, Ordering::is_gt),
            FilterOp::Lte(bound) => Self::compare(field_value, bound).map_or(false, Ordering::is_le),
            FilterOp::Lt(bound) => Self::compare(field_value, bound).map_or(false, Ordering::is_lt),
            FilterOp::Between(low, high) => {
                Self::compare(field_value, low).map_or(false, Ordering::is_ge)
                    && Self::compare(field_value, high).map_or(false, Ordering::is_le)
            }
        }
    }

    /// Exact equality match; numbers compare by value
    fn eq_match(actual: &Value, expected: &Value) -> bool {
        match (actual, expected) {
            (Value::Number(_), Value::Number(_)) => {
                Self::compare(actual, expected) == Some(Ordering::Equal)
            }
            _ => actual == expected,
        }
    }

    /// Orders two values of the same kind (numbers or strings)
    fn compare(actual: &Value, bound: &Value) -> Option<Ordering> {
        match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                    return Some(ai.cmp(&bi));
                }
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}
