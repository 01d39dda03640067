//! One generator run: read stdout, transcode, hand chunks to the response.

use std::future::Future;
use std::pin::pin;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::observability::log_session_complete;
use crate::protocol::canonical::{ChunkBatch, ChunkEvent};
use crate::protocol::cli_event::StreamEvent;
use crate::stream::{event_stream, StreamTranscoder};
use crate::transport::{GeneratorProcess, StagedPrompt};

/// Capacity of the chunk channel between the session task and the response.
pub const SESSION_CHANNEL_CAPACITY: usize = 32;

/// Per-session knobs taken from the generator and feature config.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub idle_timeout: Option<Duration>,
    pub finish_on_early_exit: bool,
}

/// Why the stdout read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Stdout reached end of file.
    EndOfOutput,
    /// No record arrived within the idle timeout.
    IdleTimeout,
    /// The response receiver was dropped.
    ClientGone,
    /// The tool-detection buffer hit its cap.
    Overflow,
}

impl SessionEnd {
    fn requires_kill(self) -> bool {
        !matches!(self, SessionEnd::EndOfOutput)
    }
}

/// Drive `events` through `transcoder`, sending chunks on `tx`.
///
/// `tx` is dropped as soon as the terminal sequence is sent so the response
/// can complete while the remaining output is drained and discarded.
pub async fn pump_events<S>(
    events: S,
    transcoder: &mut StreamTranscoder,
    idle_timeout: Option<Duration>,
    tx: &mut Option<mpsc::Sender<ChunkEvent>>,
) -> SessionEnd
where
    S: Stream<Item = StreamEvent>,
{
    let mut events = pin!(events);
    loop {
        let next = tokio::select! {
            biased;
            () = receiver_closed(tx.as_ref()) => return SessionEnd::ClientGone,
            next = next_within(events.next(), idle_timeout) => next,
        };
        let Some(next) = next else {
            return SessionEnd::IdleTimeout;
        };
        let Some(event) = next else {
            return SessionEnd::EndOfOutput;
        };

        let batch = transcoder.push_event(event);
        if !send_batch(tx.as_ref(), batch).await {
            return SessionEnd::ClientGone;
        }
        if transcoder.overflowed() {
            return SessionEnd::Overflow;
        }
        if transcoder.is_done() {
            tx.take();
        }
    }
}

/// Run one generator session to completion and release its resources.
///
/// The process is reaped and the prompt file removed on every path.
pub async fn run_session(
    mut process: GeneratorProcess,
    prompt: StagedPrompt,
    mut transcoder: StreamTranscoder,
    settings: SessionSettings,
    model: String,
    tx: mpsc::Sender<ChunkEvent>,
) {
    let start_time = Instant::now();
    let mut tx = Some(tx);

    let end = match process.take_stdout() {
        Some(stdout) => {
            pump_events(
                event_stream(stdout),
                &mut transcoder,
                settings.idle_timeout,
                &mut tx,
            )
            .await
        }
        None => SessionEnd::EndOfOutput,
    };

    match end {
        SessionEnd::ClientGone => {
            tracing::info!(model = %model, "[Stream] client disconnected, stopping generator");
        }
        SessionEnd::IdleTimeout if !transcoder.is_done() => {
            tracing::warn!(
                model = %model,
                timeout_secs = settings.idle_timeout.map(|d| d.as_secs()),
                "[Stream] generator idle timeout"
            );
        }
        SessionEnd::EndOfOutput if !transcoder.is_done() => {
            tracing::warn!(model = %model, "[Stream] generator output ended without a result event");
        }
        _ => {}
    }

    if !transcoder.is_done() && end != SessionEnd::ClientGone && settings.finish_on_early_exit {
        send_batch(tx.as_ref(), transcoder.finish_at_eof()).await;
    }
    drop(tx);

    if end.requires_kill() {
        process.kill();
    }
    let exit_code = process.wait().await;
    if prompt.cleanup().await {
        tracing::debug!("[Staging] prompt file removed");
    }
    log_session_complete(&model, exit_code, transcoder.is_done(), start_time);
}

async fn next_within<F: Future>(next: F, idle_timeout: Option<Duration>) -> Option<F::Output> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, next).await.ok(),
        None => Some(next.await),
    }
}

async fn receiver_closed(tx: Option<&mpsc::Sender<ChunkEvent>>) {
    match tx {
        Some(tx) => tx.closed().await,
        None => std::future::pending().await,
    }
}

/// Returns `false` when the receiver is gone.
async fn send_batch(tx: Option<&mpsc::Sender<ChunkEvent>>, batch: ChunkBatch) -> bool {
    let Some(sender) = tx else {
        return true;
    };
    for chunk in batch {
        if sender.send(chunk).await.is_err() {
            return false;
        }
    }
    true
}
