//! Cache-key fingerprints.
//!
//! A fingerprint is the hex SHA-256 of the normalized prompt and the
//! canonical JSON of the options that influence the result.  Prompts that
//! differ only in surrounding or repeated whitespace share a fingerprint.

use ring::digest;
use serde::Serialize;

/// Collapse runs of whitespace and trim the ends.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fingerprint `prompt` together with `options`.
///
/// `options` must serialize deterministically (structs and `BTreeMap`s do).
pub fn fingerprint<O: Serialize>(prompt: &str, options: &O) -> String {
    let options = serde_json::to_string(options).unwrap_or_default();
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(normalize_prompt(prompt).as_bytes());
    // Separator byte that cannot appear in UTF-8 text.
    ctx.update(&[0xff]);
    ctx.update(options.as_bytes());
    hex(ctx.finish().as_ref())
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whitespace_is_normalized() {
        let a = fingerprint("  check   prices\n", &json!({}));
        let b = fingerprint("check prices", &json!({}));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn options_change_fingerprint() {
        let a = fingerprint("p", &json!({"temperature": 0.1}));
        let b = fingerprint("p", &json!({"temperature": 0.2}));
        assert_ne!(a, b);
    }

    #[test]
    fn prompt_text_changes_fingerprint() {
        let fp = fingerprint("abc", &());
        assert_eq!(fp, fingerprint(" abc ", &()));
        assert_ne!(fp, fingerprint("abd", &()));
    }
}
