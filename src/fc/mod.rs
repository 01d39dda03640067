//! Marker-based tool calling over a plain-text generator.
//!
//! The generator cannot emit structured tool calls, so the prompt teaches it
//! to print a `TOOL_CALL:<json>` line instead and the transcoder recovers the
//! call from the finished text.

pub mod parser;
pub mod preprocess;
pub mod prompt;

use crate::protocol::canonical::ToolDefinition;
use crate::protocol::openai_chat::ChatMessage;

pub use parser::{find_tool_call_marker, parse_embedded_tool_call, EmbeddedToolCall};
pub use preprocess::flatten_messages;
pub use prompt::build_prompt_with_tools;

/// Literal token that introduces an embedded tool call.
pub const TOOL_CALL_MARKER: &str = "TOOL_CALL:";

/// Flatten `messages` and, when tools are offered, inject the call syntax.
#[must_use]
pub fn compose_prompt(messages: &[ChatMessage], tools: &[ToolDefinition]) -> String {
    build_prompt_with_tools(flatten_messages(messages), tools)
}
