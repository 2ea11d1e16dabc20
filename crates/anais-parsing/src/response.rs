use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response contains no JSON object or array")]
    NoPayload,
    #[error("invalid JSON payload: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Locate the JSON payload inside a model response.
///
/// Models wrap JSON in prose or code fences; the payload is the span from the
/// first `{` or `[` to the last matching closer.
pub fn extract_json_payload(raw: &str) -> Option<&str> {
    static PAYLOAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}|\[.*\]").unwrap());

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    PAYLOAD_RE.find(trimmed).map(|m| m.as_str())
}

/// Parse the JSON payload of a model response.
pub fn extract_json(raw: &str) -> Result<Value, ResponseError> {
    let payload = extract_json_payload(raw).ok_or(ResponseError::NoPayload)?;
    Ok(serde_json::from_str(payload)?)
}
