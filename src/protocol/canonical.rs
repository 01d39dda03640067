use smallvec::SmallVec;

use super::openai_chat::ChatMessage;

/// How the transcoder treats assistant text for one request.
///
/// Chosen once when the session starts and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeMode {
    /// Every text increment is forwarded as soon as it arrives.
    Passthrough,
    /// Text is held until the generator finishes so an embedded
    /// `TOOL_CALL:` marker can be recognised.
    BufferedToolDetection,
}

impl TranscodeMode {
    #[must_use]
    pub fn for_tools(tools: &[ToolDefinition]) -> Self {
        if tools.is_empty() {
            TranscodeMode::Passthrough
        } else {
            TranscodeMode::BufferedToolDetection
        }
    }
}

/// A tool the client offers, reduced to what the prompt instructions need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// Required parameters in declaration order, each with its type hint.
    pub required_parameters: Vec<ToolParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolParameter {
    pub name: String,
    pub type_hint: String,
}

/// A validated chat completion request.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub model: String,
    pub stream: bool,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub mode: TranscodeMode,
}

/// Reason the completion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
}

impl FinishReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::ToolCalls => "tool_calls",
        }
    }
}

/// One decision made by the transcoder, before wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    /// Incremental assistant text.
    Content(String),
    /// Announces a tool call: role, null content, id, name, empty arguments.
    ToolCallStart { id: String, name: String },
    /// The complete arguments text of the announced tool call.
    ToolCallArguments(String),
    /// Terminal chunk with an empty delta.
    Finish(FinishReason),
    /// The `[DONE]` sentinel.
    Done,
}

/// Events produced by one transcoder step. Most steps yield at most four.
pub type ChunkBatch = SmallVec<[ChunkEvent; 4]>;
