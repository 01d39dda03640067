use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};

use crate::state::AppState;
use crate::util::unix_now_secs;

const OWNED_BY: &str = "google";

/// Build the `OpenAI` model list for the configured catalog.
#[must_use]
pub fn build_models_response(models: &[String], created: u64) -> Value {
    let data: Vec<Value> = models
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": created,
                "owned_by": OWNED_BY,
            })
        })
        .collect();
    json!({ "object": "list", "data": data })
}

/// List the configured models in `OpenAI` format.
#[must_use]
pub fn handler(state: &AppState) -> Response {
    let body = build_models_response(&state.config.generator.models, unix_now_secs());
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )],
        Body::from(body.to_string()),
    )
        .into_response()
}
