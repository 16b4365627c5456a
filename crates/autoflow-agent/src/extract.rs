//! Structured-output extraction from generated text.
//!
//! Providers are asked for JSON but routinely wrap it in prose or code
//! fences.  [`extract_structured`] tries, in order:
//!
//! 1. the whole text as JSON,
//! 2. the first fenced code block (```` ```json ```` or bare ```` ``` ````),
//! 3. the first balanced `{...}` object embedded in the text,
//! 4. numbered or bulleted lines, returned as plain step descriptions.

use serde_json::Value;

/// What could be recovered from a generation.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// A JSON document.
    Json(Value),
    /// Best-effort list of step descriptions.
    Steps(Vec<String>),
}

/// Recover structure from `text`, or `None` if nothing usable is present.
pub fn extract_structured(text: &str) -> Option<Extracted> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(value) = parse_container(trimmed) {
        return Some(Extracted::Json(value));
    }
    if let Some(value) = fenced_blocks(trimmed).find_map(|block| parse_container(block.trim())) {
        return Some(Extracted::Json(value));
    }
    if let Some(value) = first_balanced_object(trimmed) {
        return Some(Extracted::Json(value));
    }

    let steps = list_items(trimmed);
    (!steps.is_empty()).then_some(Extracted::Steps(steps))
}

/// Parse `text` as JSON, accepting only objects and arrays.
fn parse_container(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// Iterate the bodies of ``` fenced blocks, skipping the language tag.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let open = rest.find("```")?;
        let after_open = &rest[open + 3..];
        let body_start = after_open.find('\n').map_or(0, |nl| {
            let tag = after_open[..nl].trim();
            if tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                nl + 1
            } else {
                0
            }
        });
        let body = &after_open[body_start..];
        let close = body.find("```")?;
        rest = &body[close + 3..];
        Some(&body[..close])
    })
}

/// Find the first `{` that starts a balanced, parseable JSON object.
fn first_balanced_object(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        // Stop at the first `{` that never closes.
        let close = matching_brace(bytes, open)?;
        if let Some(value) = parse_container(&text[open..=close]) {
            return Some(value);
        }
        start = open + 1;
    }
    None
}

/// Index of the `}` closing the `{` at `open`, honouring JSON strings.
fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Lines that look like `1. do x`, `2) do y`, `- do z` or `* do w`.
fn list_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let rest = strip_list_marker(line)?;
            let rest = rest.trim();
            (!rest.is_empty()).then(|| rest.to_owned())
        })
        .collect()
}

fn strip_list_marker(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest);
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let rest = &line[digits..];
    rest.strip_prefix(". ")
        .or_else(|| rest.strip_prefix(") "))
        .or_else(|| rest.strip_prefix(": "))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_json() {
        let got = extract_structured(r#"{"name": "x", "steps": []}"#).unwrap();
        assert_eq!(got, Extracted::Json(json!({"name": "x", "steps": []})));
    }

    #[test]
    fn fenced_json_block() {
        let text = "Here you go:\n```json\n{\"name\": \"fenced\"}\n```\nEnjoy.";
        let got = extract_structured(text).unwrap();
        assert_eq!(got, Extracted::Json(json!({"name": "fenced"})));
    }

    #[test]
    fn bare_fence_without_tag() {
        let text = "```\n[1, 2]\n```";
        assert_eq!(
            extract_structured(text).unwrap(),
            Extracted::Json(json!([1, 2]))
        );
    }

    #[test]
    fn embedded_object_with_braces_in_strings() {
        let text = r#"Sure! {"name": "a {tricky} one", "steps": [{"id": "s"}]} Done."#;
        let got = extract_structured(text).unwrap();
        assert_eq!(
            got,
            Extracted::Json(json!({"name": "a {tricky} one", "steps": [{"id": "s"}]}))
        );
    }

    #[test]
    fn skips_unparseable_object_and_finds_next() {
        let text = r#"{not json} then {"ok": true}"#;
        assert_eq!(
            extract_structured(text).unwrap(),
            Extracted::Json(json!({"ok": true}))
        );
    }

    #[test]
    fn numbered_lines_fallback() {
        let text = "Steps:\n1. Open the site\n2) Click login\n- Extract the price\nThanks";
        let got = extract_structured(text).unwrap();
        assert_eq!(
            got,
            Extracted::Steps(vec![
                "Open the site".into(),
                "Click login".into(),
                "Extract the price".into(),
            ])
        );
    }

    #[test]
    fn plain_prose_yields_nothing() {
        assert_eq!(extract_structured("I cannot help with that."), None);
        assert_eq!(extract_structured("   "), None);
    }

    #[test]
    fn scalar_json_is_not_structure() {
        assert_eq!(extract_structured("42"), None);
    }

    #[test]
    fn unclosed_braces_are_scanned_once() {
        let text = format!("broken {} end", "{ ".repeat(200_000));
        assert_eq!(first_balanced_object(&text), None);
    }

    #[test]
    fn unparseable_object_before_valid_one_is_skipped() {
        let text = r#"see {not json} then {"name": "later"}"#;
        assert_eq!(first_balanced_object(text), Some(json!({"name": "later"})));
    }
}
