use memchr::memmem;
use serde::Deserialize;
use serde_json::Value;

use super::TOOL_CALL_MARKER;

/// A tool invocation recovered from assistant text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedToolCall {
    pub name: String,
    /// Arguments as JSON text: verbatim when the model sent a string,
    /// serialized otherwise, `{}` when absent.
    pub arguments: String,
}

#[derive(Deserialize)]
struct MarkerPayload {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Byte offset of the first call marker in `text`.
#[must_use]
pub fn find_tool_call_marker(text: &str) -> Option<usize> {
    memmem::find(text.as_bytes(), TOOL_CALL_MARKER.as_bytes())
}

/// Parse a marker-prefixed slice such as `TOOL_CALL:{"name":..,"arguments":..}`.
///
/// The payload after the marker must be exactly one JSON object with a string
/// `name`; trailing text is rejected.
///
/// # Errors
///
/// Returns the JSON error when the payload does not parse.
pub fn parse_embedded_tool_call(marker_slice: &str) -> Result<EmbeddedToolCall, serde_json::Error> {
    let payload = marker_slice
        .strip_prefix(TOOL_CALL_MARKER)
        .unwrap_or(marker_slice)
        .trim();
    let MarkerPayload { name, arguments } = serde_json::from_str(payload)?;
    let arguments = match arguments {
        None => "{}".to_string(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    };
    Ok(EmbeddedToolCall { name, arguments })
}
