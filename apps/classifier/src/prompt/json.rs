//! Lenient JSON extraction from LLM output.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("LLM returned empty content")]
    Empty,

    #[error("invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Decodes a JSON value from raw model output.
///
/// Newlines are collapsed first, then the payload is taken from a ```json fence (or a bare
/// ``` fence opening the text) when there is one. Anything else must decode as a whole;
/// bracketed citations such as `[45]` inside prose are not an answer.
pub fn parse_llm_json(text: &str) -> Result<Value, ParseError> {
    let collapsed = text.replace(['\r', '\n'], " ");
    let body = fenced_payload(&collapsed);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

fn fenced_payload(text: &str) -> &str {
    let text = text.trim();
    if let Some(inner) = strip_leading_fence(text) {
        return inner;
    }
    // A tagged fence after a short preamble.
    for tag in ["```json", "```JSON"] {
        if let Some(start) = text.find(tag) {
            let rest = &text[start + tag.len()..];
            let end = rest.find("```").unwrap_or(rest.len());
            return rest[..end].trim();
        }
    }
    text
}

/// Content of a ```json or bare ``` fence opening the text, up to the closing fence.
fn strip_leading_fence(text: &str) -> Option<&str> {
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```JSON"))
        .or_else(|| text.strip_prefix("```"))?;
    let end = inner.find("```").unwrap_or(inner.len());
    Some(inner[..end].trim())
}
