//! Events printed by the generator in its line-delimited JSON output mode.

use serde::Deserialize;

/// One decoded line of generator stdout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// An incremental piece of a message.
    Message {
        #[serde(default)]
        role: String,
        #[serde(default, deserialize_with = "deserialize_lenient_text")]
        content: String,
    },
    /// Generation finished. Statistics and status fields are ignored.
    Result {},
    /// Any other `type` (init, tool_use, ...).
    #[serde(other)]
    Unrecognized,
}

impl StreamEvent {
    /// The text increment carried by a non-empty assistant message.
    #[must_use]
    pub fn into_assistant_text(self) -> Option<String> {
        let StreamEvent::Message { role, content } = self else {
            return None;
        };
        (role == "assistant" && !content.is_empty()).then_some(content)
    }
}

fn deserialize_lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(text)) => text,
        _ => String::new(),
    })
}

/// Parse one trimmed line of generator stdout.
///
/// # Errors
///
/// Returns the JSON error when the line is not a JSON object with a string
/// `type` field.
pub fn parse_stream_event(line: &str) -> Result<StreamEvent, serde_json::Error> {
    serde_json::from_str(line)
}
