pub mod decoder;
pub mod response_encoder;
pub mod stream;

use serde::Deserialize;
use serde_json::Value;

/// `OpenAI` Chat Completion request wire type.
///
/// Unknown top-level fields are accepted and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub tools: Option<Vec<OpenAiTool>>,
    /// Accepted for compatibility; the generator has no way to honour it.
    #[serde(default)]
    pub tool_choice: Option<Value>,
}

/// `OpenAI` message wire type.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallRecord>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Convenience constructor for plain text messages.
    #[must_use]
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }
}

/// Message content: plain text or an ordered list of parts.
///
/// An absent or `null` content is represented by `None` on [`ChatMessage`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// JSON text of the content as the client sent it.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        match self {
            MessageContent::Text(text) => Value::String(text.clone()).to_string(),
            MessageContent::Parts(parts) => {
                Value::Array(parts.iter().map(ContentPart::to_json_value).collect()).to_string()
            }
        }
    }
}

/// One element of an array-form message content.
///
/// Only `{"type":"text","text":"..."}` parts carry text; anything else is
/// kept verbatim so it can be echoed back as JSON.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum ContentPart {
    Text(String),
    Other(Value),
}

impl From<Value> for ContentPart {
    fn from(value: Value) -> Self {
        let is_text = value.get("type").and_then(Value::as_str) == Some("text");
        match value.get("text").and_then(Value::as_str) {
            Some(text) if is_text => ContentPart::Text(text.to_string()),
            _ => ContentPart::Other(value),
        }
    }
}

impl ContentPart {
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        match self {
            ContentPart::Text(text) => serde_json::json!({ "type": "text", "text": text }),
            ContentPart::Other(value) => value.clone(),
        }
    }
}

/// A tool call carried in an assistant message's history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Value")]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments_json: String,
}

impl From<Value> for ToolCallRecord {
    fn from(value: Value) -> Self {
        let function = value.get("function");
        let name = function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let arguments_json = match function.and_then(|f| f.get("arguments")) {
            None | Some(Value::Null) => "{}".to_string(),
            Some(Value::String(args)) => args.clone(),
            Some(other) => other.to_string(),
        };
        Self {
            name,
            arguments_json,
        }
    }
}

/// A tool definition.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiTool {
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    pub function: OpenAiToolFunction,
}

/// A function declaration within a tool.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiToolFunction {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}
