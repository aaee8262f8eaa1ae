//! Resilient extraction of structured values from free model text.
//!
//! Generation output is unreliable. It may be plain prose, fenced JSON, JSON
//! wrapped in commentary, or JSON that only partly matches the expected
//! shape. [`extract`] always returns a usable `T`:
//!
//! ```text
//! raw text
//!   │ strip ``` fences
//!   ▼
//! locate first '{' or '[' and its balanced close   ── none ──► fallback
//!   │
//!   ▼
//! serde_json::Value                                ── error ─► fallback
//!   │
//!   ├─ strict decode + validate ok ──────────────────────────► Valid(x)
//!   │
//!   └─ shallow merge key-by-key over the fallback, dropping
//!      keys that break decoding or validation ─── ≥1 key ────► Merged(x)
//!                                                 0 keys ────► Fallback
//! ```
//!
//! Nothing in this module panics or returns an error.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

/// A type that can be recovered from model output.
pub trait Extractable: Serialize + DeserializeOwned {
    /// Semantic checks beyond the serde shape.
    ///
    /// # Errors
    /// A human-readable reason the value is unacceptable.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Extractable for Value {}

/// How an extraction was resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    /// The located JSON decoded and validated as-is.
    Valid(T),
    /// Some keys were taken from the located JSON, the rest from the fallback.
    Merged {
        /// The merged value.
        value: T,
        /// Keys that were present but rejected.
        dropped: Vec<String>,
    },
    /// Nothing usable was found.
    Fallback(T),
}

impl<T> Extraction<T> {
    /// The extracted value, however it was obtained.
    pub fn into_inner(self) -> T {
        match self {
            Self::Valid(v) | Self::Merged { value: v, .. } | Self::Fallback(v) => v,
        }
    }

    /// Whether the fallback was returned untouched.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Recover a `T` from `raw`, or return `fallback`.
pub fn extract<T: Extractable + Clone>(raw: &str, fallback: &T) -> T {
    extract_detailed(raw, fallback).into_inner()
}

/// Like [`extract`], but report how the value was obtained.
pub fn extract_detailed<T: Extractable + Clone>(raw: &str, fallback: &T) -> Extraction<T> {
    let cleaned = strip_fences(raw);
    let Some(slice) = locate_json(&cleaned) else {
        debug!(len = raw.len(), "no JSON delimiters in model output");
        return Extraction::Fallback(fallback.clone());
    };

    let parsed: Value = match serde_json::from_str(slice) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "located JSON failed to parse");
            return Extraction::Fallback(fallback.clone());
        }
    };

    if let Some(value) = decode_valid::<T>(parsed.clone()) {
        return Extraction::Valid(value);
    }

    merge_over_fallback(parsed, fallback)
}

/// Prose outside the located JSON, with fences removed.
///
/// Used when a narration response is just text, or text wrapped around a
/// JSON block.
#[must_use]
pub fn prose_outside_json(raw: &str) -> String {
    let cleaned = strip_fences(raw);
    match locate_json(&cleaned) {
        Some(slice) => cleaned.replacen(slice, " ", 1),
        None => cleaned,
    }
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

fn decode_valid<T: Extractable>(value: Value) -> Option<T> {
    let decoded: T = serde_json::from_value(value).ok()?;
    match decoded.validate() {
        Ok(()) => Some(decoded),
        Err(reason) => {
            debug!(%reason, "extracted value failed validation");
            None
        }
    }
}

fn merge_over_fallback<T: Extractable + Clone>(parsed: Value, fallback: &T) -> Extraction<T> {
    let (Value::Object(incoming), Ok(Value::Object(base))) =
        (parsed, serde_json::to_value(fallback))
    else {
        return Extraction::Fallback(fallback.clone());
    };

    let mut merged: Map<String, Value> = base;
    let mut accepted = 0usize;
    let mut dropped = Vec::new();

    for (key, value) in incoming {
        let previous = merged.insert(key.clone(), value);
        if decode_valid::<T>(Value::Object(merged.clone())).is_some() {
            accepted += 1;
            continue;
        }
        match previous {
            Some(old) => {
                merged.insert(key.clone(), old);
            }
            None => {
                merged.remove(&key);
            }
        }
        dropped.push(key);
    }

    if accepted == 0 {
        debug!(dropped = dropped.len(), "no usable keys; using fallback");
        return Extraction::Fallback(fallback.clone());
    }

    match decode_valid::<T>(Value::Object(merged)) {
        Some(value) => {
            debug!(accepted, dropped = dropped.len(), "merged partial model output over fallback");
            Extraction::Merged { value, dropped }
        }
        None => Extraction::Fallback(fallback.clone()),
    }
}

// ---------------------------------------------------------------------------
// Text scanning
// ---------------------------------------------------------------------------

/// Remove markdown code fences (and their language tags), keeping the body.
fn strip_fences(raw: &str) -> String {
    if !raw.contains("```") {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for (i, part) in raw.split("```").enumerate() {
        if i % 2 == 1 {
            // inside a fence: drop a leading language tag line
            let body = match part.find('\n') {
                Some(nl) if part[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                    &part[nl + 1..]
                }
                _ => part,
            };
            out.push_str(body);
        } else {
            out.push_str(part);
        }
        out.push('\n');
    }
    out
}

/// Find the first JSON object or array and return its text.
///
/// The opener that appears first wins. The matching close is found by
/// bracket balancing that ignores brackets inside strings; if the text is
/// truncated, the last matching closer is used instead.
fn locate_json(text: &str) -> Option<&str> {
    let brace = text.find('{');
    let bracket = text.find('[');
    let (start, open, close) = match (brace, bracket) {
        (Some(b), Some(k)) if k < b => (k, b'[', b']'),
        (Some(b), _) => (b, b'{', b'}'),
        (None, Some(k)) => (k, b'[', b']'),
        (None, None) => return None,
    };

    if let Some(end) = balanced_end(text.as_bytes(), start, open, close) {
        return Some(&text[start..=end]);
    }
    let end = text.rfind(char::from(close))?;
    (end > start).then(|| &text[start..=end])
}

fn balanced_end(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
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
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Verdict {
        #[serde(default)]
        name: String,
        #[serde(default)]
        stress: f32,
        #[serde(default)]
        tags: Vec<String>,
    }

    impl Extractable for Verdict {
        fn validate(&self) -> Result<(), String> {
            if (0.0..=100.0).contains(&self.stress) {
                Ok(())
            } else {
                Err(format!("stress {} out of range", self.stress))
            }
        }
    }

    fn fallback() -> Verdict {
        Verdict {
            name: "nobody".to_string(),
            stress: 10.0,
            tags: vec![],
        }
    }

    #[test]
    fn plain_prose_yields_fallback() {
        let out = extract_detailed("The lights flicker and die.", &fallback());
        assert_eq!(out, Extraction::Fallback(fallback()));
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "Here you go:\n```json\n\
                   {\"name\": \"Ada\", \"stress\": 40, \"tags\": [\"a\"]}\n```\nDone.";
        let out = extract(raw, &fallback());
        assert_eq!(out.name, "Ada");
        assert_eq!(out.tags, vec!["a".to_string()]);
    }

    #[test]
    fn surrounding_prose_and_braces_in_strings() {
        let raw = r#"Sure! {"name": "Curly } brace", "stress": 5} and then {"name": "second"}"#;
        let out = extract_detailed(raw, &fallback());
        match out {
            Extraction::Valid(v) => assert_eq!(v.name, "Curly } brace"),
            other => panic!("expected valid, got {other:?}"),
        }
    }

    #[test]
    fn invalid_field_is_dropped_and_rest_merged() {
        let raw = r#"{"name": "Bram", "stress": 400}"#;
        match extract_detailed(raw, &fallback()) {
            Extraction::Merged { value, dropped } => {
                assert_eq!(value.name, "Bram");
                assert!((value.stress - 10.0).abs() < f32::EPSILON);
                assert_eq!(dropped, vec!["stress".to_string()]);
            }
            other => panic!("expected merge, got {other:?}"),
        }
    }

    #[test]
    fn wrong_type_field_is_dropped() {
        let raw = r#"{"name": "Bram", "tags": "not-a-list"}"#;
        let out = extract(raw, &fallback());
        assert_eq!(out.name, "Bram");
        assert!(out.tags.is_empty());
    }

    #[test]
    fn array_when_object_expected_is_fallback() {
        let out = extract_detailed("[1, 2, 3]", &fallback());
        assert!(out.is_fallback());
    }

    #[test]
    fn broken_json_is_fallback() {
        let out = extract_detailed(r#"{"name": "Ada", "stress": }"#, &fallback());
        assert!(out.is_fallback());
    }

    #[test]
    fn trailing_junk_after_object_is_ignored() {
        let raw = r#"{"name": "Ada", "tags": ["x"]} trailing { junk"#;
        assert_eq!(extract(raw, &fallback()).name, "Ada");
    }

    #[test]
    fn bracket_before_brace_selects_array() {
        let value: Value = extract("note [1, {\"a\": 2}] end", &Value::Null);
        assert!(value.is_array());
    }

    #[test]
    fn prose_outside_json_strips_block() {
        let raw = "The door groans.\n```json\n{\"x\": 1}\n```\nSomething breathes.";
        assert_eq!(prose_outside_json(raw), "The door groans. Something breathes.");
    }

    #[test]
    fn rendered_value_round_trips() {
        let v = Verdict {
            name: "Ada".to_string(),
            stress: 55.5,
            tags: vec!["lantern".to_string()],
        };
        let raw = serde_json::to_string(&v).expect("serialize");
        assert_eq!(extract(&raw, &fallback()), v);
    }
}
