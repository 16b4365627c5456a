//! Boolean condition evaluation over execution state.
//!
//! A [`Condition`] compares two operands with an [`Operator`].  Operands that
//! are strings starting with `$` are paths resolved against a [`Scope`]
//! (`"$user.age"`); every other value is a literal.  A path that does not
//! resolve is *undefined*, and any comparison involving an undefined operand
//! is false, `not_equals` included.
//!
//! Evaluation fails closed: type mismatches, bad regexes and undefined
//! operands all produce `false`.  The reason is logged at debug level and
//! never propagated.

use std::cmp::Ordering;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::scope::Scope;

/// Prefix marking an operand as a context path.
pub const PATH_SENTINEL: char = '$';

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "==", alias = "eq", alias = "equal")]
    Equals,
    #[serde(alias = "!=", alias = "ne", alias = "not_equal")]
    NotEquals,
    #[serde(alias = ">", alias = "gt")]
    GreaterThan,
    #[serde(alias = "<", alias = "lt")]
    LessThan,
    #[serde(alias = ">=", alias = "gte", alias = "greater_than_or_equal")]
    GreaterOrEqual,
    #[serde(alias = "<=", alias = "lte", alias = "less_than_or_equal")]
    LessOrEqual,
    #[serde(alias = "includes")]
    Contains,
    #[serde(alias = "regex", alias = "match")]
    Matches,
}

/// `left <operator> right`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Value,
    pub operator: Operator,
    #[serde(default)]
    pub right: Value,
}

impl Condition {
    pub fn new(left: impl Into<Value>, operator: Operator, right: impl Into<Value>) -> Self {
        Self {
            left: left.into(),
            operator,
            right: right.into(),
        }
    }
}

/// Why a condition evaluated to false without a real comparison.
#[derive(Debug, thiserror::Error)]
enum ConditionError {
    #[error("operand `{0}` is undefined")]
    Undefined(String),

    #[error("cannot apply {operator:?} to {left} and {right}")]
    TypeMismatch {
        operator: Operator,
        left: String,
        right: String,
    },

    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Evaluate one condition; never fails.
pub fn evaluate(condition: &Condition, scope: &dyn Scope) -> bool {
    match try_evaluate(condition, scope) {
        Ok(result) => result,
        Err(e) => {
            debug!(operator = ?condition.operator, error = %e, "condition evaluated to false");
            false
        }
    }
}

/// Evaluate every condition with logical AND.  An empty list is true.
pub fn evaluate_all(conditions: &[Condition], scope: &dyn Scope) -> bool {
    conditions.iter().all(|c| evaluate(c, scope))
}

fn try_evaluate(condition: &Condition, scope: &dyn Scope) -> Result<bool, ConditionError> {
    let left = resolve_operand(&condition.left, scope)?;
    let right = resolve_operand(&condition.right, scope)?;
    let op = condition.operator;

    let result = match op {
        Operator::Equals => loosely_equal(&left, &right),
        Operator::NotEquals => !loosely_equal(&left, &right),
        Operator::GreaterThan => compare(op, &left, &right)? == Ordering::Greater,
        Operator::LessThan => compare(op, &left, &right)? == Ordering::Less,
        Operator::GreaterOrEqual => compare(op, &left, &right)? != Ordering::Less,
        Operator::LessOrEqual => compare(op, &left, &right)? != Ordering::Greater,
        Operator::Contains => contains(&left, &right)?,
        Operator::Matches => matches_pattern(&left, &right)?,
    };
    Ok(result)
}

/// Resolve a `$path` operand or pass a literal through.
fn resolve_operand(operand: &Value, scope: &dyn Scope) -> Result<Value, ConditionError> {
    match operand {
        Value::String(s) if s.starts_with(PATH_SENTINEL) => {
            let path = &s[PATH_SENTINEL.len_utf8()..];
            scope
                .lookup(path)
                .ok_or_else(|| ConditionError::Undefined(s.clone()))
        }
        other => Ok(other.clone()),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_))
        | (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_)) => match (as_number(left), as_number(right)) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        },
        _ => left == right,
    }
}

fn compare(op: Operator, left: &Value, right: &Value) -> Result<Ordering, ConditionError> {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return l.partial_cmp(&r).ok_or_else(|| mismatch(op, left, right));
    }
    match (left, right) {
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        _ => Err(mismatch(op, left, right)),
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, ConditionError> {
    match haystack {
        Value::String(s) => match needle {
            Value::String(n) => Ok(s.contains(n.as_str())),
            Value::Number(_) | Value::Bool(_) => Ok(s.contains(&needle.to_string())),
            _ => Err(mismatch(Operator::Contains, haystack, needle)),
        },
        Value::Array(items) => Ok(items.iter().any(|item| loosely_equal(item, needle))),
        Value::Object(map) => match needle {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Err(mismatch(Operator::Contains, haystack, needle)),
        },
        _ => Err(mismatch(Operator::Contains, haystack, needle)),
    }
}

fn matches_pattern(text: &Value, pattern: &Value) -> Result<bool, ConditionError> {
    let (Value::String(text), Value::String(pattern)) = (text, pattern) else {
        return Err(mismatch(Operator::Matches, text, pattern));
    };
    let regex = Regex::new(pattern).map_err(|e| ConditionError::InvalidPattern {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;
    Ok(regex.is_match(text))
}

fn mismatch(operator: Operator, left: &Value, right: &Value) -> ConditionError {
    ConditionError::TypeMismatch {
        operator,
        left: type_name(left).into(),
        right: type_name(right).into(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "price": 19.5,
            "count": "3",
            "title": "Weekly Deals",
            "tags": ["sale", "new"],
            "user": {"name": "ada"}
        })
    }

    fn eval(left: Value, op: Operator, right: Value) -> bool {
        evaluate(&Condition::new(left, op, right), &ctx())
    }

    #[test]
    fn equality_with_paths_and_literals() {
        assert!(eval(json!("$user.name"), Operator::Equals, json!("ada")));
        assert!(eval(json!("$count"), Operator::Equals, json!(3)));
        assert!(eval(json!("$price"), Operator::NotEquals, json!(20)));
        assert!(eval(json!("plain"), Operator::Equals, json!("plain")));
    }

    #[test]
    fn ordering() {
        assert!(eval(json!("$price"), Operator::LessThan, json!(20)));
        assert!(eval(json!("$count"), Operator::GreaterOrEqual, json!(3)));
        assert!(eval(json!("b"), Operator::GreaterThan, json!("a")));
        assert!(!eval(json!("$tags"), Operator::GreaterThan, json!(1)));
    }

    #[test]
    fn containment() {
        assert!(eval(json!("$title"), Operator::Contains, json!("Deals")));
        assert!(eval(json!("$tags"), Operator::Contains, json!("sale")));
        assert!(eval(json!("$user"), Operator::Contains, json!("name")));
        assert!(!eval(json!(5), Operator::Contains, json!(5)));
    }

    #[test]
    fn regex_match_and_bad_pattern() {
        assert!(eval(json!("$title"), Operator::Matches, json!("^Weekly\\s")));
        assert!(!eval(json!("$title"), Operator::Matches, json!("(unclosed")));
    }

    #[test]
    fn undefined_operand_is_false_for_every_operator() {
        let ops = [
            Operator::Equals,
            Operator::NotEquals,
            Operator::GreaterThan,
            Operator::LessThan,
            Operator::GreaterOrEqual,
            Operator::LessOrEqual,
            Operator::Contains,
            Operator::Matches,
        ];
        for op in ops {
            assert!(!eval(json!("$missing.path"), op, json!("x")), "{op:?}");
            assert!(!eval(json!("x"), op, json!("$missing")), "{op:?}");
        }
    }

    #[test]
    fn evaluate_all_is_conjunction() {
        let conditions = vec![
            Condition::new("$price", Operator::GreaterThan, 10),
            Condition::new("$title", Operator::Contains, "Deals"),
        ];
        assert!(evaluate_all(&conditions, &ctx()));
        let mut failing = conditions.clone();
        failing.push(Condition::new("$nope", Operator::Equals, 1));
        assert!(!evaluate_all(&failing, &ctx()));
        assert!(evaluate_all(&[], &ctx()));
    }

    #[test]
    fn operator_aliases_deserialize() {
        let c: Condition =
            serde_json::from_value(json!({"left": "$price", "operator": ">=", "right": 1})).unwrap();
        assert_eq!(c.operator, Operator::GreaterOrEqual);
    }
}
