//! Strict JSON parsing of sanitized model output.

use thiserror::Error;

/// How much of the offending text is kept for diagnostics.
pub const EXCERPT_CHARS: usize = 200;

/// The sanitized response was not valid JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("model did not return valid JSON ({reason}): {excerpt}")]
pub struct MalformedResponse {
    /// Start of the offending text, truncated to [`EXCERPT_CHARS`] characters.
    pub excerpt: String,
    /// Parser message.
    pub reason: String,
}

/// Parse the whole string as JSON. No partial recovery.
pub fn parse_json(sanitized: &str) -> Result<serde_json::Value, MalformedResponse> {
    serde_json::from_str(sanitized).map_err(|e| MalformedResponse {
        excerpt: excerpt(sanitized),
        reason: e.to_string(),
    })
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}
