//! Data transforms for `transform` steps.
//!
//! A transform reads one input value (a named prior output, a `$path`, or
//! the most recent step output) and applies one [`TransformOp`]:
//!
//! | operation   | input        | output                                   |
//! |-------------|--------------|------------------------------------------|
//! | `filter`    | array        | items whose condition holds (`$item...`) |
//! | `map`       | array/scalar | plucked field or rendered template       |
//! | `aggregate` | array        | sum, avg, min, max, count, join, first, last |
//! | `parse`     | string       | parsed JSON                              |
//! | `stringify` | any          | JSON text                                |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::{Condition, evaluate};
use crate::scope::{ItemScope, Scope, get_path};
use crate::template::{display, resolve_value};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Action payload of a `transform` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformAction {
    /// Step id, variable name or `$path` to read.  Defaults to the previous
    /// step's output.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "input")]
    pub source: Option<String>,
    #[serde(flatten)]
    pub op: TransformOp,
}

/// The operation a transform applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TransformOp {
    Filter {
        condition: Condition,
    },
    Map {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<Value>,
    },
    Aggregate {
        function: AggregateFn,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        separator: Option<String>,
    },
    Parse,
    Stringify {
        #[serde(default)]
        pretty: bool,
    },
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFn {
    Sum,
    #[serde(alias = "average", alias = "mean")]
    Avg,
    Min,
    Max,
    Count,
    Join,
    First,
    Last,
}

/// Why a transform could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("`{operation}` expects an array, got {found}")]
    ExpectedArray {
        operation: &'static str,
        found: &'static str,
    },

    #[error("`map` needs a `field` or a `template`")]
    EmptyMap,

    #[error("input is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply `op` to `input`.  `scope` backs non-`item` paths in filter
/// conditions and map templates.
pub fn apply(op: &TransformOp, input: Value, scope: &dyn Scope) -> Result<Value, TransformError> {
    match op {
        TransformOp::Filter { condition } => {
            let items = expect_array("filter", input)?;
            Ok(Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .filter(|(i, item)| evaluate(condition, &ItemScope::new(item, *i, scope)))
                    .map(|(_, item)| item)
                    .collect(),
            ))
        }
        TransformOp::Map { field, template } => {
            let map_one = |item: &Value, i: usize| -> Result<Value, TransformError> {
                match (field, template) {
                    (Some(field), _) => Ok(get_path(item, field).cloned().unwrap_or(Value::Null)),
                    (None, Some(template)) => {
                        Ok(resolve_value(template, &ItemScope::new(item, i, scope)))
                    }
                    (None, None) => Err(TransformError::EmptyMap),
                }
            };
            match input {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| map_one(item, i))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                scalar => map_one(&scalar, 0),
            }
        }
        TransformOp::Aggregate {
            function,
            field,
            separator,
        } => {
            let items = expect_array("aggregate", input)?;
            let values: Vec<Value> = match field {
                Some(field) => items
                    .iter()
                    .filter_map(|item| get_path(item, field).cloned())
                    .collect(),
                None => items,
            };
            Ok(aggregate(*function, &values, separator.as_deref()))
        }
        TransformOp::Parse => match input {
            Value::String(text) => Ok(serde_json::from_str(&text)?),
            other => Ok(other),
        },
        TransformOp::Stringify { pretty } => {
            let text = if *pretty {
                serde_json::to_string_pretty(&input)?
            } else {
                serde_json::to_string(&input)?
            };
            Ok(Value::String(text))
        }
    }
}

fn aggregate(function: AggregateFn, values: &[Value], separator: Option<&str>) -> Value {
    let numbers = || {
        values.iter().filter_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    };
    match function {
        AggregateFn::Count => Value::from(values.len()),
        AggregateFn::Sum => number(numbers().sum()),
        AggregateFn::Avg => {
            let (sum, n) = numbers().fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
            if n == 0 { Value::Null } else { number(sum / n as f64) }
        }
        AggregateFn::Min => numbers().reduce(f64::min).map_or(Value::Null, number),
        AggregateFn::Max => numbers().reduce(f64::max).map_or(Value::Null, number),
        AggregateFn::Join => Value::String(
            values
                .iter()
                .map(display)
                .collect::<Vec<_>>()
                .join(separator.unwrap_or(",")),
        ),
        AggregateFn::First => values.first().cloned().unwrap_or(Value::Null),
        AggregateFn::Last => values.last().cloned().unwrap_or(Value::Null),
    }
}

/// Integral results stay integers so `sum([1, 2])` is `3`, not `3.0`.
fn number(x: f64) -> Value {
    if x.fract() == 0.0 && x.abs() < 9.0e15 {
        Value::from(x as i64)
    } else {
        serde_json::Number::from_f64(x).map_or(Value::Null, Value::Number)
    }
}

fn expect_array(operation: &'static str, input: Value) -> Result<Vec<Value>, TransformError> {
    match input {
        Value::Array(items) => Ok(items),
        other => Err(TransformError::ExpectedArray {
            operation,
            found: match other {
                Value::Null => "null",
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Object(_) => "object",
                Value::Array(_) => "array",
            },
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
