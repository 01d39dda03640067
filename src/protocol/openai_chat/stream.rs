use crate::protocol::canonical::ChunkEvent;
use crate::stream::sse::DONE_FRAME;
use crate::util::{push_json_string_escaped, push_u64_decimal};

/// Serializes transcoder decisions into `chat.completion.chunk` SSE frames.
///
/// One encoder serves one response: every chunk shares its id, model and
/// `created` timestamp.
#[derive(Debug, Clone)]
pub struct ChunkEncoder {
    id: String,
    model: String,
    created: u64,
}

impl ChunkEncoder {
    #[must_use]
    pub fn new(id: String, model: String, created: u64) -> Self {
        Self { id, model, created }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Encode one event as a complete `data: ...\n\n` frame.
    #[must_use]
    pub fn encode(&self, event: &ChunkEvent) -> String {
        let mut out = String::new();
        self.encode_into(event, &mut out);
        out
    }

    /// Append the frame for `event` to `out`.
    pub fn encode_into(&self, event: &ChunkEvent, out: &mut String) {
        match event {
            ChunkEvent::Content(text) => {
                out.reserve(128 + self.id.len() + self.model.len() + text.len());
                self.push_chunk_prefix(out);
                out.push_str(",\"choices\":[{\"index\":0,\"delta\":{\"content\":");
                push_json_string_escaped(out, text);
                out.push_str("},\"finish_reason\":null}]}\n\n");
            }
            ChunkEvent::ToolCallStart { id: call_id, name } => {
                out.reserve(224 + self.id.len() + self.model.len() + call_id.len() + name.len());
                self.push_chunk_prefix(out);
                out.push_str(
                    ",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":null,\
                     \"tool_calls\":[{\"index\":0,\"id\":",
                );
                push_json_string_escaped(out, call_id);
                out.push_str(",\"type\":\"function\",\"function\":{\"name\":");
                push_json_string_escaped(out, name);
                out.push_str(",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n\n");
            }
            ChunkEvent::ToolCallArguments(arguments) => {
                out.reserve(176 + self.id.len() + self.model.len() + arguments.len());
                self.push_chunk_prefix(out);
                out.push_str(
                    ",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\
                     \"function\":{\"arguments\":",
                );
                push_json_string_escaped(out, arguments);
                out.push_str("}}]},\"finish_reason\":null}]}\n\n");
            }
            ChunkEvent::Finish(reason) => {
                out.reserve(128 + self.id.len() + self.model.len());
                self.push_chunk_prefix(out);
                out.push_str(",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"");
                out.push_str(reason.as_str());
                out.push_str("\"}]}\n\n");
            }
            ChunkEvent::Done => out.push_str(DONE_FRAME),
        }
    }

    fn push_chunk_prefix(&self, out: &mut String) {
        out.push_str("data: {\"id\":");
        push_json_string_escaped(out, &self.id);
        out.push_str(",\"object\":\"chat.completion.chunk\",\"created\":");
        push_u64_decimal(out, self.created);
        out.push_str(",\"model\":");
        push_json_string_escaped(out, &self.model);
    }
}
