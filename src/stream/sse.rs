//! SSE (Server-Sent Events) framing helpers for the response body.
use axum::body::Body;
use axum::response::Response;

/// The fixed stream terminator, emitted exactly once and always last.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Wrap a streaming body in a `200 text/event-stream` response.
///
/// Proxy buffering is disabled so each frame reaches the client as soon as
/// it is written.
#[must_use]
pub fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    headers.insert(
        http::HeaderName::from_static("x-accel-buffering"),
        http::HeaderValue::from_static("no"),
    );
    response
}
