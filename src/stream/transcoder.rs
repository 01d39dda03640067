use smallvec::smallvec;

use crate::fc::{find_tool_call_marker, parse_embedded_tool_call, EmbeddedToolCall};
use crate::protocol::canonical::{ChunkBatch, ChunkEvent, FinishReason, TranscodeMode};
use crate::protocol::cli_event::StreamEvent;
use crate::util::{next_call_id, truncate_chars};

const DETECTED_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Streaming,
    Buffering,
    Done,
}

/// Turns decoded generator events into chunk decisions for one response.
///
/// In [`TranscodeMode::Passthrough`] every assistant increment is forwarded
/// immediately. In [`TranscodeMode::BufferedToolDetection`] text is held until
/// the generator finishes, then emitted either as one content chunk or as a
/// structured tool call. Exactly one terminal sequence (finish chunk then
/// `[DONE]`) is produced; events after it are ignored.
#[derive(Debug)]
pub struct StreamTranscoder {
    mode: TranscodeMode,
    state: SessionState,
    buffer: String,
    max_buffered_bytes: usize,
    overflowed: bool,
}

impl StreamTranscoder {
    #[must_use]
    pub fn new(mode: TranscodeMode, max_buffered_bytes: usize) -> Self {
        Self {
            mode,
            state: SessionState::Idle,
            buffer: String::new(),
            max_buffered_bytes,
            overflowed: false,
        }
    }

    #[must_use]
    pub fn mode(&self) -> TranscodeMode {
        self.mode
    }

    /// Whether the terminal sequence has been emitted.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == SessionState::Done
    }

    /// Whether buffering stopped because the size cap was reached.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Consume one event in arrival order.
    pub fn push_event(&mut self, event: StreamEvent) -> ChunkBatch {
        if self.is_done() {
            return ChunkBatch::new();
        }
        match event {
            StreamEvent::Result {} => self.finalize(),
            StreamEvent::Unrecognized => ChunkBatch::new(),
            message @ StreamEvent::Message { .. } => match message.into_assistant_text() {
                Some(text) => self.push_text(text),
                None => ChunkBatch::new(),
            },
        }
    }

    /// Finalize as though the generator had reported completion.
    ///
    /// Used when stdout ends or stalls before a `result` event. Returns an
    /// empty batch if the session already finished.
    pub fn finish_at_eof(&mut self) -> ChunkBatch {
        if self.is_done() {
            return ChunkBatch::new();
        }
        self.finalize()
    }

    fn push_text(&mut self, text: String) -> ChunkBatch {
        match self.mode {
            TranscodeMode::Passthrough => {
                self.state = SessionState::Streaming;
                smallvec![ChunkEvent::Content(text)]
            }
            TranscodeMode::BufferedToolDetection => {
                self.state = SessionState::Buffering;
                if self.buffer.len() + text.len() > self.max_buffered_bytes {
                    tracing::warn!(
                        buffered_bytes = self.buffer.len(),
                        incoming_bytes = text.len(),
                        limit = self.max_buffered_bytes,
                        "[Stream] response buffer limit reached, finishing early"
                    );
                    self.overflowed = true;
                    return self.finalize();
                }
                self.buffer.push_str(&text);
                ChunkBatch::new()
            }
        }
    }

    fn finalize(&mut self) -> ChunkBatch {
        self.state = SessionState::Done;
        match self.mode {
            TranscodeMode::Passthrough => {
                smallvec![ChunkEvent::Finish(FinishReason::Stop), ChunkEvent::Done]
            }
            TranscodeMode::BufferedToolDetection => {
                let buffer = std::mem::take(&mut self.buffer);
                resolve_buffered_text(buffer.trim())
            }
        }
    }
}

fn resolve_buffered_text(text: &str) -> ChunkBatch {
    let Some(marker_pos) = find_tool_call_marker(text) else {
        let mut batch = ChunkBatch::new();
        if !text.is_empty() {
            batch.push(ChunkEvent::Content(text.to_string()));
        }
        batch.push(ChunkEvent::Finish(FinishReason::Stop));
        batch.push(ChunkEvent::Done);
        return batch;
    };

    let marker_slice = &text[marker_pos..];
    tracing::info!(
        call = truncate_chars(marker_slice, DETECTED_PREVIEW_CHARS),
        "[ToolCall] Detected"
    );
    match parse_embedded_tool_call(marker_slice) {
        Ok(EmbeddedToolCall { name, arguments }) => smallvec![
            ChunkEvent::ToolCallStart {
                id: next_call_id(),
                name,
            },
            ChunkEvent::ToolCallArguments(arguments),
            ChunkEvent::Finish(FinishReason::ToolCalls),
            ChunkEvent::Done,
        ],
        Err(err) => {
            tracing::warn!(
                error = %err,
                call = truncate_chars(marker_slice, DETECTED_PREVIEW_CHARS),
                "[ToolCall] Failed to parse tool call JSON, returning it as text"
            );
            smallvec![
                ChunkEvent::Content(marker_slice.to_string()),
                ChunkEvent::Finish(FinishReason::Stop),
                ChunkEvent::Done,
            ]
        }
    }
}
