//! JSON recovery from free-text model replies
//!
//! Models wrap their JSON in prose and code fences more often than not. The
//! extractor looks for the first fenced block that decodes to a JSON object,
//! then falls back to a linear scan for the first balanced `{ ... }` span.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Result, TriageError};

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("fence regex is valid")
    })
}

/// Extract the first JSON object from a model reply
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>> {
    for caps in fence_regex().captures_iter(text) {
        let body = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            return Ok(map);
        }
    }

    let candidate = first_braced_span(text)
        .ok_or_else(|| TriageError::ResponseParse("no JSON object found in reply".to_string()))?;

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(TriageError::ResponseParse(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(TriageError::ResponseParse(format!("invalid JSON: {}", e))),
    }
}

/// First balanced `{ ... }` span, skipping braces inside string literals
pub fn first_braced_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
