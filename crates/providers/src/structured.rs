//! Structured-output coercion.
//!
//! When a provider's native JSON mechanism does not emit, the response text
//! is scanned for JSON with a fixed ladder: the whole text, then fenced code
//! blocks, then the largest `{…}` / `[…]` substring. Callers validate the
//! extracted value against their schema themselves.

use regex::Regex;
use serde_json::Value;

/// Try to pull a JSON value out of free-form response text.
///
/// Returns `None` when nothing in the text parses.
pub fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    // 1. The whole text.
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    // 2. Fenced code blocks (```json ... ``` or ``` ... ```).
    let fence = Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?```").expect("static regex");
    for cap in fence.captures_iter(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(cap[1].trim()) {
            tracing::debug!("extracted JSON from fenced code block");
            return Some(v);
        }
    }

    // 3. Largest object substring.
    if let Some(v) = largest_delimited(trimmed, '{', '}') {
        tracing::debug!("extracted JSON object from response body");
        return Some(v);
    }

    // 4. Largest array substring.
    if let Some(v) = largest_delimited(trimmed, '[', ']') {
        tracing::debug!("extracted JSON array from response body");
        return Some(v);
    }

    None
}

/// Extract the first JSON array from text - the learning-extraction parse
/// path, which tolerates prose around the array.
pub fn extract_json_array(content: &str) -> Option<Vec<Value>> {
    match extract_json(content)? {
        Value::Array(items) => Some(items),
        _ => {
            // The top-level parse may have found an object; look for an
            // array substring specifically.
            largest_delimited(content, '[', ']').and_then(|v| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
        }
    }
}

/// Find the outermost `open … close` span and parse it.
fn largest_delimited(text: &str, open: char, close: char) -> Option<Value> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}
