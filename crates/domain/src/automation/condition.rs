//! Condition — a predicate over trigger data that gates action execution.
//!
//! Conditions form an ordered list. Each condition's
//! [`logical_operator`](Condition::logical_operator) says how it combines
//! with the *next* condition, and the list is folded strictly left to
//! right: `a AND b OR c` is `(a AND b) OR c`, never `a AND (b OR c)`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison applied between the extracted field and the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
}

/// How a condition combines with the one that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    fn combine(self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Or => left || right,
        }
    }
}

/// A single predicate over a dotted path into the trigger data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-separated path, e.g. `"data.status"`.
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    /// Combination with the next condition; `AND` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

impl Condition {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: Operator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            logical_operator: None,
        }
    }

    /// Set how this condition combines with the next one.
    #[must_use]
    pub fn then(mut self, logical_operator: LogicalOperator) -> Self {
        self.logical_operator = Some(logical_operator);
        self
    }

    /// Evaluate this condition against the trigger data.
    ///
    /// A missing field only satisfies `is_empty`, `not_equals` and
    /// `not_contains`. Comparisons between incompatible types are `false`.
    #[must_use]
    pub fn evaluate(&self, data: &Value) -> bool {
        let actual = extract_field(data, &self.field);
        match self.operator {
            Operator::IsEmpty => is_empty(actual),
            Operator::IsNotEmpty => !is_empty(actual),
            Operator::Equals => actual.is_some_and(|v| loose_eq(v, &self.value)),
            Operator::NotEquals => !actual.is_some_and(|v| loose_eq(v, &self.value)),
            Operator::GreaterThan => {
                actual.is_some_and(|v| compare(v, &self.value) == Some(std::cmp::Ordering::Greater))
            }
            Operator::LessThan => {
                actual.is_some_and(|v| compare(v, &self.value) == Some(std::cmp::Ordering::Less))
            }
            Operator::Contains => actual.is_some_and(|v| contains(v, &self.value)),
            Operator::NotContains => !actual.is_some_and(|v| contains(v, &self.value)),
        }
    }
}

/// Fold `conditions` left to right over `data`.
///
/// An empty list is vacuously true.
#[must_use]
pub fn evaluate_all(conditions: &[Condition], data: &Value) -> bool {
    let Some((first, rest)) = conditions.split_first() else {
        return true;
    };

    let mut result = first.evaluate(data);
    let mut pending = first.logical_operator.unwrap_or_default();
    for condition in rest {
        result = pending.combine(result, condition.evaluate(data));
        pending = condition.logical_operator.unwrap_or_default();
    }
    result
}

/// Walk a dot-separated path into `data`.
///
/// Object keys are matched by name, array elements by numeric index.
/// Returns `None` as soon as an intermediate segment is missing.
#[must_use]
pub fn extract_field<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

fn loose_eq(actual: &Value, expected: &Value) -> bool {
    // 100 and 100.0 are the same number
    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return (a - b).abs() < f64::EPSILON;
    }
    actual == expected
}

fn compare(actual: &Value, expected: &Value) -> Option<std::cmp::Ordering> {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| loose_eq(item, expected)),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}
