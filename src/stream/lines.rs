//! Incremental decoding of generator output into lines and events.

use std::collections::VecDeque;

use bytes::BytesMut;
use futures_util::{future, Stream, StreamExt};
use memchr::memchr;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::protocol::cli_event::{parse_stream_event, StreamEvent};
use crate::util::truncate_chars;

const READ_CHUNK_BYTES: usize = 8 * 1024;
const LOGGED_LINE_CHARS: usize = 200;

/// Splits a byte stream into newline-delimited text lines.
///
/// Bytes are buffered until a `\n` arrives, so records and multi-byte UTF-8
/// sequences split across reads are reassembled before decoding. Lines that
/// are blank after trimming are dropped.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: BytesMut,
    scanned: usize,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and append every completed line to `out`.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut VecDeque<String>) {
        self.buffer.extend_from_slice(chunk);
        while let Some(rel_pos) = memchr(b'\n', &self.buffer[self.scanned..]) {
            let line = self.buffer.split_to(self.scanned + rel_pos + 1);
            self.scanned = 0;
            push_line(&line[..line.len() - 1], out);
        }
        self.scanned = self.buffer.len();
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish_into(&mut self, out: &mut VecDeque<String>) {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            push_line(&rest, out);
        }
        self.scanned = 0;
    }

    /// Bytes held while waiting for the end of the current line.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn push_line(bytes: &[u8], out: &mut VecDeque<String>) {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push_back(trimmed.to_string());
    }
}

/// Lazily read `reader` to the end, yielding non-blank lines in order.
///
/// A read error ends the stream after flushing what was already buffered.
pub fn line_stream<R>(reader: R) -> impl Stream<Item = String> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    futures_util::stream::unfold(
        (
            reader,
            LineDecoder::new(),
            BytesMut::with_capacity(READ_CHUNK_BYTES),
            VecDeque::<String>::new(),
            false,
        ),
        |(mut reader, mut decoder, mut read_buf, mut pending, mut eof)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((line, (reader, decoder, read_buf, pending, eof)));
                }
                if eof {
                    return None;
                }

                read_buf.clear();
                read_buf.reserve(READ_CHUNK_BYTES);
                match reader.read_buf(&mut read_buf).await {
                    Ok(0) => {
                        decoder.finish_into(&mut pending);
                        eof = true;
                    }
                    Ok(_) => decoder.feed_into(&read_buf, &mut pending),
                    Err(err) => {
                        tracing::warn!(error = %err, "[Stream] read error, closing line stream");
                        decoder.finish_into(&mut pending);
                        eof = true;
                    }
                }
            }
        },
    )
}

/// Decode one line into a [`StreamEvent`], logging and dropping malformed input.
#[must_use]
pub fn decode_event_line(line: &str) -> Option<StreamEvent> {
    match parse_stream_event(line) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(
                error = %err,
                line = truncate_chars(line, LOGGED_LINE_CHARS),
                "[Stream] Failed to parse JSON line, dropping it"
            );
            None
        }
    }
}

/// Lazily decode generator stdout into events.
///
/// Malformed lines never end the stream; it terminates when `reader` does.
pub fn event_stream<R>(reader: R) -> impl Stream<Item = StreamEvent> + Send
where
    R: AsyncRead + Unpin + Send + 'static,
{
    line_stream(reader).filter_map(|line| future::ready(decode_event_line(&line)))
}
