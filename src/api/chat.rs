use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::ProxyError;
use crate::fc::compose_prompt;
use crate::protocol::canonical::{CanonicalRequest, ChunkEvent};
use crate::protocol::openai_chat::decoder::decode_openai_chat_body;
use crate::protocol::openai_chat::response_encoder::CompletionAggregator;
use crate::protocol::openai_chat::stream::ChunkEncoder;
use crate::state::AppState;
use crate::stream::{sse_ok_response, StreamTranscoder};
use crate::util::unix_now_secs;

use super::session::{run_session, SessionSettings, SESSION_CHANNEL_CAPACITY};

/// `POST /v1/chat/completions`.
pub async fn handler(state: Arc<AppState>, body: Bytes) -> Response {
    match handle(&state, &body).await {
        Ok(response) => response,
        Err(err) => {
            match &err {
                ProxyError::InvalidRequest(message) => {
                    tracing::warn!(error = %message, "[Request] Invalid request body");
                }
                other => tracing::error!(error = %other, "[Request] chat completion failed"),
            }
            err.into_response()
        }
    }
}

async fn handle(state: &AppState, body: &[u8]) -> Result<Response, ProxyError> {
    let generator = &state.config.generator;
    let request = decode_openai_chat_body(body, &generator.default_model)?;
    let prompt = compose_prompt(&request.messages, &request.tools);
    tracing::info!(
        stream = request.stream,
        prompt_len = prompt.len(),
        tools = request.tools.len(),
        model = %request.model,
        "[Request] chat completion"
    );

    let identity = state.next_request();
    let staged = state.stager.stage(&prompt, identity.prompt_token).await?;
    let process = match state.launcher.spawn(&staged, &request.model).await {
        Ok(process) => process,
        Err(err) => {
            staged.cleanup().await;
            return Err(err);
        }
    };

    let CanonicalRequest {
        model,
        stream,
        mode,
        ..
    } = request;
    let settings = SessionSettings {
        idle_timeout: generator.idle_timeout_secs.map(Duration::from_secs),
        finish_on_early_exit: state.config.features.finish_on_early_exit,
    };
    let transcoder = StreamTranscoder::new(mode, generator.max_buffered_bytes);
    let encoder = ChunkEncoder::new(identity.completion_id, model.clone(), unix_now_secs());

    let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    tokio::spawn(run_session(process, staged, transcoder, settings, model, tx));

    if stream {
        Ok(sse_ok_response(sse_body(encoder, rx)))
    } else {
        collect_completion(encoder, rx).await
    }
}

fn sse_body(encoder: ChunkEncoder, rx: mpsc::Receiver<ChunkEvent>) -> Body {
    let frames = futures_util::stream::unfold((encoder, rx), |(encoder, mut rx)| async move {
        let chunk = rx.recv().await?;
        let frame = Bytes::from(encoder.encode(&chunk));
        Some((Ok::<_, Infallible>(frame), (encoder, rx)))
    });
    Body::from_stream(frames)
}

async fn collect_completion(
    encoder: ChunkEncoder,
    mut rx: mpsc::Receiver<ChunkEvent>,
) -> Result<Response, ProxyError> {
    let mut aggregator = CompletionAggregator::new();
    while let Some(chunk) = rx.recv().await {
        aggregator.push(&chunk);
    }
    if !aggregator.is_finished() {
        return Err(ProxyError::Process(
            "generator exited without completing the response".to_string(),
        ));
    }
    let body = aggregator.into_response(encoder.id(), encoder.model(), encoder.created());
    Ok(Json(body).into_response())
}
