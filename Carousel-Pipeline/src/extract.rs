use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model output for one text stage: always the raw text, plus the JSON value
/// when one could be recovered from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageText {
    pub raw: String,
    pub parsed: Option<Value>,
}

impl StageText {
    /// Best-effort parse of `raw`. Never fails.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let parsed = extract_json(&raw);
        Self { raw, parsed }
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }

    /// Deserialize the parsed value into `T`, if there is one and it fits.
    pub fn parse_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.parsed
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Recover a JSON object or array from free-form model output.
///
/// Tries, in order: the whole text, the first fenced code block, and the
/// span from the first `{`/`[` to its last matching closer.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(val) = parse_structured(trimmed) {
        return Some(val);
    }

    if let Some(block) = extract_json_block(trimmed) {
        if let Some(val) = parse_structured(&block) {
            return Some(val);
        }
    }

    let idx = match (trimmed.find('{'), trimmed.find('[')) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    let candidate = &trimmed[idx..];
    if let Some(val) = parse_structured(candidate) {
        return Some(val);
    }
    let close = if candidate.starts_with('{') { '}' } else { ']' };
    let end = candidate.rfind(close)?;
    parse_structured(&candidate[..=end])
}

/// Only objects and arrays count; a bare number or string is not stage output.
fn parse_structured(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(val @ (Value::Object(_) | Value::Array(_))) => Some(val),
        _ => None,
    }
}

/// Extract the body of the first ```json ... ``` (or bare ```) block.
pub fn extract_json_block(text: &str) -> Option<String> {
    let markers = ["```json", "```JSON", "```"];
    for marker in markers {
        if let Some(start) = text.find(marker) {
            let content_start = start + marker.len();
            if let Some(end) = text[content_start..].find("```") {
                return Some(text[content_start..content_start + end].trim().to_string());
            }
        }
    }
    None
}
