use crate::protocol::openai_chat::{ChatMessage, ContentPart, MessageContent};
use crate::util::capitalize_first;

/// Separator placed between rendered messages.
pub const MESSAGE_SEPARATOR: &str = "\n\n";

/// Render a conversation as one linear text prompt.
///
/// - `tool` messages become `Tool Result: <content>`; non-text content is
///   written as its JSON text.
/// - Assistant messages with tool-call history become the optional inline
///   text followed by one `Called: name(arguments)` line per call.
/// - Everything else becomes `<Role>: <text>`, where array content
///   contributes its text parts joined by newlines.
#[must_use]
pub fn flatten_messages(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for (idx, message) in messages.iter().enumerate() {
        if idx > 0 {
            out.push_str(MESSAGE_SEPARATOR);
        }
        render_message(message, &mut out);
    }
    out
}

fn render_message(message: &ChatMessage, out: &mut String) {
    if message.role == "tool" {
        out.push_str("Tool Result: ");
        match &message.content {
            Some(MessageContent::Text(text)) => out.push_str(text),
            Some(content) => out.push_str(&content.to_json_string()),
            None => out.push_str("null"),
        }
        return;
    }

    out.push_str(&capitalize_first(&message.role));
    out.push_str(": ");

    if message.role == "assistant" {
        if let Some(calls) = message.tool_calls.as_deref().filter(|calls| !calls.is_empty()) {
            if let Some(MessageContent::Text(text)) = &message.content {
                if !text.is_empty() {
                    out.push_str(text);
                    out.push('\n');
                }
            }
            for (idx, call) in calls.iter().enumerate() {
                if idx > 0 {
                    out.push('\n');
                }
                out.push_str("Called: ");
                out.push_str(&call.name);
                out.push('(');
                out.push_str(&call.arguments_json);
                out.push(')');
            }
            return;
        }
    }

    match &message.content {
        Some(MessageContent::Text(text)) => out.push_str(text),
        Some(MessageContent::Parts(parts)) => push_text_parts(parts, out),
        None => {}
    }
}

fn push_text_parts(parts: &[ContentPart], out: &mut String) {
    let mut first = true;
    for part in parts {
        if let ContentPart::Text(text) = part {
            if !first {
                out.push('\n');
            }
            out.push_str(text);
            first = false;
        }
    }
}
