//! Parsing of backend replies into expression drafts.
//!
//! Generative backends are asked for bare JSON but routinely wrap it in prose
//! or code fences. The reply is parsed directly first; failing that, the first
//! balanced `{...}` block is cut out and parsed on its own.

use crate::error::GenerateError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Unvalidated expression as returned by a backend.
///
/// All fields are optional in the backend contract; the orchestrator fills the
/// defaults and clamps `parameters` against the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionDraft {
    pub label: Option<String>,
    pub parameters: BTreeMap<String, f64>,
    pub duration_ms: Option<u64>,
}

impl ExpressionDraft {
    /// Reads the `{"expression", "parameters", "duration"}` contract out of a JSON object.
    ///
    /// Non-numeric parameter values are skipped. Numeric strings are accepted.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let label = object
            .get("expression")
            .and_then(Value::as_str)
            .map(str::to_string);

        let parameters = object
            .get("parameters")
            .and_then(Value::as_object)
            .map(|params| {
                params
                    .iter()
                    .filter_map(|(id, value)| numeric(value).map(|v| (id.clone(), v)))
                    .collect()
            })
            .unwrap_or_default();

        let duration_ms = object.get("duration").and_then(|value| {
            value
                .as_u64()
                .or_else(|| numeric(value).filter(|v| *v >= 0.0).map(|v| v.round() as u64))
        });

        Self {
            label,
            parameters,
            duration_ms,
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Returns the first balanced `{...}` substring of `text`, if any.
///
/// Braces inside JSON string literals are ignored.
pub fn first_balanced_object(text: &str) -> Option<&str> {
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
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extracts a JSON object from free-form backend text.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, GenerateError> {
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(object);
    }

    let block = first_balanced_object(text)
        .ok_or_else(|| GenerateError::Backend("no JSON object found in backend reply".to_string()))?;

    match serde_json::from_str::<Value>(block) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(GenerateError::Backend(
            "backend reply is not a JSON object".to_string(),
        )),
        Err(e) => Err(GenerateError::Backend(format!(
            "failed to decode JSON in backend reply: {}",
            e
        ))),
    }
}

/// Full reply → draft pipeline used by every expression strategy.
pub fn parse_expression_reply(text: &str) -> Result<ExpressionDraft, GenerateError> {
    extract_json_object(text).map(|object| ExpressionDraft::from_object(&object))
}
