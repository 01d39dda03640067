use serde_json::{json, Value};

use crate::protocol::canonical::{ChunkEvent, FinishReason};

#[derive(Debug, Clone, Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds the transcoder's chunk decisions into one `chat.completion` body.
#[derive(Debug, Clone, Default)]
pub struct CompletionAggregator {
    content: String,
    tool_call: Option<PendingToolCall>,
    finish_reason: Option<FinishReason>,
}

impl CompletionAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: &ChunkEvent) {
        match event {
            ChunkEvent::Content(text) => self.content.push_str(text),
            ChunkEvent::ToolCallStart { id, name } => {
                self.tool_call = Some(PendingToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: String::new(),
                });
            }
            ChunkEvent::ToolCallArguments(arguments) => {
                if let Some(call) = self.tool_call.as_mut() {
                    call.arguments.push_str(arguments);
                }
            }
            ChunkEvent::Finish(reason) => self.finish_reason = Some(*reason),
            ChunkEvent::Done => {}
        }
    }

    /// Whether a terminal chunk has been folded in.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Render the aggregated completion.
    #[must_use]
    pub fn into_response(self, id: &str, model: &str, created: u64) -> Value {
        let finish_reason = self.finish_reason.unwrap_or(FinishReason::Stop);
        let message = match self.tool_call {
            Some(call) => json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": call.id,
                    "type": "function",
                    "function": {"name": call.name, "arguments": call.arguments}
                }]
            }),
            None => json!({"role": "assistant", "content": self.content}),
        };
        json!({
            "id": id,
            "object": "chat.completion",
            "created": created,
            "model": model,
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": finish_reason.as_str()
            }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_completion() {
        let mut aggregator = CompletionAggregator::new();
        for event in [
            ChunkEvent::Content("Hel".into()),
            ChunkEvent::Content("lo".into()),
        ] {
            aggregator.push(&event);
        }
        assert!(!aggregator.is_finished());
        aggregator.push(&ChunkEvent::Finish(FinishReason::Stop));
        aggregator.push(&ChunkEvent::Done);
        assert!(aggregator.is_finished());

        let body = aggregator.into_response("chatcmpl-1", "gemini-2.5-pro", 42);
        assert_eq!(
            body,
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "created": 42,
                "model": "gemini-2.5-pro",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hello"},
                    "finish_reason": "stop"
                }]
            })
        );
    }

    #[test]
    fn test_tool_call_completion() {
        let mut aggregator = CompletionAggregator::new();
        for event in [
            ChunkEvent::ToolCallStart {
                id: "call_0000000000000001".into(),
                name: "read".into(),
            },
            ChunkEvent::ToolCallArguments("{\"filePath\":\"/a\"}".into()),
            ChunkEvent::Finish(FinishReason::ToolCalls),
            ChunkEvent::Done,
        ] {
            aggregator.push(&event);
        }
        let body = aggregator.into_response("chatcmpl-2", "gemini", 1);
        let choice = &body["choices"][0];
        assert_eq!(choice["finish_reason"], "tool_calls");
        assert!(choice["message"]["content"].is_null());
        assert_eq!(
            choice["message"]["tool_calls"],
            json!([{
                "id": "call_0000000000000001",
                "type": "function",
                "function": {"name": "read", "arguments": "{\"filePath\":\"/a\"}"}
            }])
        );
    }
}
