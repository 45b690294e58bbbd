//! Condition clause evaluation for conditional routing.
//!
//! A conditional node carries an ordered clause list. Each clause compares
//! one field of the submitted form data against a configured value; the
//! first matching clause selects the outgoing connection whose
//! `condition_value` equals the clause's route tag.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator applied between a form field and a clause value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    In,
}

/// One ordered routing rule on a conditional node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionClause {
    /// Field of the submitted form data this clause reads.
    pub field: String,
    pub operator: ConditionOperator,
    /// Value the field is compared against. For `In`, an array of candidates.
    pub value: Value,
    /// Route tag; the connection whose `condition_value` equals this tag
    /// fires when the clause matches.
    pub route: String,
}

/// Evaluate a single clause against submitted form data.
///
/// A missing field never matches, except under `NotEquals`, where a missing
/// field is treated as "not equal".
pub fn evaluate_clause(clause: &ConditionClause, form_data: &Value) -> bool {
    let field = form_data.get(&clause.field);

    match clause.operator {
        ConditionOperator::Equals => field.is_some_and(|f| loose_eq(f, &clause.value)),
        ConditionOperator::NotEquals => !field.is_some_and(|f| loose_eq(f, &clause.value)),
        ConditionOperator::GreaterThan => compare(field, &clause.value).is_some_and(|o| o.is_gt()),
        ConditionOperator::LessThan => compare(field, &clause.value).is_some_and(|o| o.is_lt()),
        ConditionOperator::Contains => field.is_some_and(|f| contains(f, &clause.value)),
        ConditionOperator::In => field.is_some_and(|f| {
            clause
                .value
                .as_array()
                .is_some_and(|candidates| candidates.iter().any(|c| loose_eq(f, c)))
        }),
    }
}

/// Select the route tag of the first matching clause, in clause order.
pub fn select_route<'c>(clauses: &'c [ConditionClause], form_data: &Value) -> Option<&'c str> {
    clauses
        .iter()
        .find(|c| evaluate_clause(c, form_data))
        .map(|c| c.route.as_str())
}

/// Equality that tolerates the string/number mismatch endemic to submitted
/// form payloads: `"3"` equals `3`, and everything else falls back to
/// strict JSON equality.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => as_str(a).zip(as_str(b)).is_some_and(|(x, y)| x == y),
    }
}

fn compare(field: Option<&Value>, value: &Value) -> Option<std::cmp::Ordering> {
    let f = as_f64(field?)?;
    let v = as_f64(value)?;
    f.partial_cmp(&v)
}

fn contains(field: &Value, value: &Value) -> bool {
    match field {
        Value::String(s) => as_str(value).is_some_and(|needle| s.contains(&needle)),
        Value::Array(items) => items.iter().any(|item| loose_eq(item, value)),
        _ => false,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
