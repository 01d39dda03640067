use axum::http::{header, HeaderValue, StatusCode};
use axum::response::IntoResponse;

pub const HEALTH_TEXT: &str = "Gemini CLI Proxy is running!";

/// Liveness probe; returns a fixed plain-text body.
pub fn handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        HEALTH_TEXT,
    )
}
