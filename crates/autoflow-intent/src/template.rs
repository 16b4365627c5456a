//! `{{path}}` placeholder substitution.
//!
//! Action payloads may reference execution state with `{{path}}`.  A string
//! that is exactly one placeholder is replaced by the referenced value with
//! its JSON type intact; placeholders embedded in longer text are rendered
//! as text.  Unresolvable placeholders are left untouched so the failure is
//! visible in the step's output.

use serde_json::Value;

use crate::scope::Scope;

/// Resolve every placeholder inside `value`, recursively.
pub fn resolve_value(value: &Value, scope: &dyn Scope) -> Value {
    match value {
        Value::String(s) => resolve_str(s, scope),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, scope)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, scope)).collect()),
        other => other.clone(),
    }
}

/// Resolve placeholders in a single string.
pub fn resolve_str(text: &str, scope: &dyn Scope) -> Value {
    if let Some(path) = single_placeholder(text) {
        return scope
            .lookup(path)
            .unwrap_or_else(|| Value::String(text.to_owned()));
    }
    if !text.contains("{{") {
        return Value::String(text.to_owned());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let placeholder = &rest[open..open + 2 + close + 2];
        let path = rest[open + 2..open + 2 + close].trim();
        out.push_str(&rest[..open]);
        match scope.lookup(path) {
            Some(value) => out.push_str(&display(&value)),
            None => out.push_str(placeholder),
        }
        rest = &rest[open + 2 + close + 2..];
    }
    out.push_str(rest);
    Value::String(out)
}

/// The path inside `text` if it is exactly one `{{path}}`.
fn single_placeholder(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    (!inner.contains("{{") && !inner.contains("}}")).then(|| inner.trim())
}

/// Text rendering of a JSON value: strings raw, everything else as JSON.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
