#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use futures_util::StreamExt;
use gemini_cli_proxy::config::AppConfig;
use gemini_cli_proxy::routing::dispatch_request;
use gemini_cli_proxy::state::AppState;
use serde_json::{json, Value};

const RESULT_LINE: &str = r#"'{"type":"result","status":"success","stats":{"total_tokens":3}}'"#;

struct Harness {
    state: Arc<AppState>,
    scratch: tempfile::TempDir,
}

impl Harness {
    fn new(script: &str) -> Self {
        Self::with_config(script, |_| {})
    }

    fn with_config(script: &str, tweak: impl FnOnce(&mut AppConfig)) -> Self {
        let scratch = tempfile::tempdir().expect("scratch dir");
        let mut config = AppConfig::default();
        config.generator.binary = "sh".to_string();
        config.generator.args = vec!["-c".to_string(), script.to_string(), "gemini".to_string()];
        config.generator.scratch_dir = scratch.path().to_path_buf();
        tweak(&mut config);
        Self {
            state: Arc::new(AppState::new(config)),
            scratch,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        dispatch_request(Arc::clone(&self.state), Arc::from(""), request)
            .await
            .expect("infallible")
    }

    async fn chat(&self, body: &Value) -> Response {
        self.send(
            Request::post("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
        )
        .await
    }

    /// Cleanup runs on the session task after the body ends.
    async fn assert_scratch_empties(&self) {
        for _ in 0..100 {
            if scratch_entries(self.scratch.path()).is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!(
            "scratch dir not cleaned: {:?}",
            scratch_entries(self.scratch.path())
        );
    }
}

fn scratch_entries(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(Result::ok).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// A script that swallows the prompt and prints `lines`, one per line.
fn emit(lines: &[&str]) -> String {
    format!("cat > /dev/null\nprintf '%s\\n' {}", lines.join(" "))
}

fn message_line(content: &str) -> String {
    let event = json!({"type": "message", "role": "assistant", "content": content, "delta": true});
    format!("'{}'", event.to_string().replace('\'', r"'\''"))
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Split an SSE body into JSON payloads; `[DONE]` becomes `Value::Null`.
fn sse_payloads(text: &str) -> Vec<Value> {
    assert!(text.ends_with("\n\n") || text.is_empty(), "unterminated frame: {text:?}");
    text.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| {
            let data = frame.strip_prefix("data: ").expect("data frame");
            if data == "[DONE]" {
                Value::Null
            } else {
                serde_json::from_str(data).expect("json chunk")
            }
        })
        .collect()
}

fn user_request(content: &str) -> Value {
    json!({
        "model": "gemini-2.5-pro",
        "messages": [{"role": "user", "content": content}]
    })
}

fn tools_request() -> Value {
    json!({
        "model": "gemini-2.5-pro",
        "messages": [
            {"role": "system", "content": "You are a coding agent."},
            {"role": "user", "content": "Read /a"}
        ],
        "tools": [{
            "type": "function",
            "function": {
                "name": "read",
                "description": "Reads a file.\nSupports offsets.",
                "parameters": {
                    "type": "object",
                    "properties": {"filePath": {"type": "string"}},
                    "required": ["filePath"]
                }
            }
        }]
    })
}

#[tokio::test]
async fn test_passthrough_stream() {
    let hi = message_line("Hi");
    let there = message_line(" there");
    let harness = Harness::new(&emit(&[
        r#"'{"type":"init","session_id":"s1"}'"#,
        &hi,
        &there,
        RESULT_LINE,
    ]));

    let response = harness.chat(&user_request("hello")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream; charset=utf-8"
    );
    assert_eq!(response.headers()["cache-control"], "no-cache");
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let payloads = sse_payloads(&body_text(response).await);
    assert_eq!(payloads.len(), 4);
    assert_eq!(payloads[0]["choices"][0]["delta"], json!({"content": "Hi"}));
    assert_eq!(payloads[1]["choices"][0]["delta"], json!({"content": " there"}));
    assert_eq!(payloads[2]["choices"][0]["delta"], json!({}));
    assert_eq!(payloads[2]["choices"][0]["finish_reason"], "stop");
    assert!(payloads[3].is_null());

    let id = payloads[0]["id"].as_str().expect("id");
    assert!(id.starts_with("chatcmpl-"));
    for chunk in &payloads[..3] {
        assert_eq!(chunk["id"], id);
        assert_eq!(chunk["object"], "chat.completion.chunk");
        assert_eq!(chunk["model"], "gemini-2.5-pro");
        assert_eq!(chunk["created"], payloads[0]["created"]);
    }
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_tool_call_stream_and_prompt() {
    let capture = tempfile::tempdir().expect("capture dir");
    let prompt_path = capture.path().join("prompt.txt");
    let args_path = capture.path().join("args.txt");
    let first = message_line("Sure.\nTOOL_CALL:{\"name\":\"read\",");
    let second = message_line("\"arguments\":{\"filePath\":\"/a\"}}");
    let script = format!(
        "cat > '{}'\nprintf '%s ' \"$@\" > '{}'\nprintf '%s\\n' {first} {second} {RESULT_LINE}",
        prompt_path.display(),
        args_path.display(),
    );
    let harness = Harness::new(&script);

    let payloads = sse_payloads(&body_text(harness.chat(&tools_request()).await).await);
    assert_eq!(payloads.len(), 4);
    let announce = &payloads[0]["choices"][0];
    assert!(announce["finish_reason"].is_null());
    assert_eq!(announce["delta"]["role"], "assistant");
    assert!(announce["delta"]["content"].is_null());
    let call = &announce["delta"]["tool_calls"][0];
    assert_eq!(call["index"], 0);
    assert_eq!(call["type"], "function");
    assert_eq!(call["function"]["name"], "read");
    assert_eq!(call["function"]["arguments"], "");
    assert!(call["id"].as_str().expect("call id").starts_with("call_"));

    let arguments = payloads[1]["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"]
        .as_str()
        .expect("arguments");
    assert_eq!(
        serde_json::from_str::<Value>(arguments).expect("arguments json"),
        json!({"filePath": "/a"})
    );
    assert_eq!(payloads[2]["choices"][0]["finish_reason"], "tool_calls");
    assert!(payloads[3].is_null());

    let prompt = std::fs::read_to_string(&prompt_path).expect("captured prompt");
    assert!(prompt.starts_with("=== OUTPUT FORMAT INSTRUCTIONS ==="));
    assert!(prompt.contains("  read(filePath: string) \u{2014} Reads a file.\n"));
    assert!(!prompt.contains("Supports offsets."));
    assert!(prompt.ends_with("System: You are a coding agent.\n\nUser: Read /a"));

    let args = std::fs::read_to_string(&args_path).expect("captured args");
    assert_eq!(args.trim_end(), "--model gemini-2.5-pro --output-format stream-json");
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_tool_mode_plain_answer_is_buffered() {
    let a = message_line("A");
    let b = message_line("B");
    let harness = Harness::new(&emit(&[&a, &b, RESULT_LINE]));
    let payloads = sse_payloads(&body_text(harness.chat(&tools_request()).await).await);
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads[0]["choices"][0]["delta"], json!({"content": "AB"}));
    assert_eq!(payloads[1]["choices"][0]["finish_reason"], "stop");
    assert!(payloads[2].is_null());
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_malformed_tool_call_falls_back_to_text() {
    let broken = message_line("Working on it. TOOL_CALL:{\"name\":\"read\",");
    let harness = Harness::new(&emit(&[&broken, RESULT_LINE]));
    let payloads = sse_payloads(&body_text(harness.chat(&tools_request()).await).await);
    assert_eq!(payloads.len(), 3);
    assert_eq!(
        payloads[0]["choices"][0]["delta"],
        json!({"content": "TOOL_CALL:{\"name\":\"read\","})
    );
    assert_eq!(payloads[1]["choices"][0]["finish_reason"], "stop");
    assert!(payloads[2].is_null());
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_noise_on_stdout_and_stderr_is_tolerated() {
    let hi = message_line("Hi");
    let script = format!(
        "cat > /dev/null\necho 'Loaded cached credentials.' >&2\necho 'warning: quota' >&2\n\
         printf '%s\\n' 'not json at all' '' '   ' {hi} '{{\"type\":\"tool_use\"}}' {RESULT_LINE}"
    );
    let harness = Harness::new(&script);
    let payloads = sse_payloads(&body_text(harness.chat(&user_request("hi")).await).await);
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads[0]["choices"][0]["delta"]["content"], "Hi");
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_non_streaming_completion() {
    let hello = message_line("Hello");
    let harness = Harness::new(&emit(&[&hello, RESULT_LINE]));
    let mut request = user_request("hi");
    request["stream"] = json!(false);

    let response = harness.chat(&request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).expect("json body");
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "gemini-2.5-pro");
    assert_eq!(
        body["choices"][0]["message"],
        json!({"role": "assistant", "content": "Hello"})
    );
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_non_streaming_tool_call() {
    let call = message_line("TOOL_CALL:{\"name\":\"read\",\"arguments\":{\"filePath\":\"/a\"}}");
    let harness = Harness::new(&emit(&[&call, RESULT_LINE]));
    let mut request = tools_request();
    request["stream"] = json!(false);

    let body: Value =
        serde_json::from_str(&body_text(harness.chat(&request).await).await).expect("json body");
    let choice = &body["choices"][0];
    assert_eq!(choice["finish_reason"], "tool_calls");
    assert!(choice["message"]["content"].is_null());
    assert_eq!(choice["message"]["tool_calls"][0]["function"]["name"], "read");
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_missing_result_is_finalized_by_default() {
    let partial = message_line("partial");
    let harness = Harness::new(&format!("{}\nexit 2", emit(&[&partial])));
    let payloads = sse_payloads(&body_text(harness.chat(&user_request("hi")).await).await);
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads[0]["choices"][0]["delta"]["content"], "partial");
    assert_eq!(payloads[1]["choices"][0]["finish_reason"], "stop");
    assert!(payloads[2].is_null());
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_missing_result_without_early_finish() {
    let partial = message_line("partial");
    let script = emit(&[&partial]);
    let harness = Harness::with_config(&script, |config| {
        config.features.finish_on_early_exit = false;
    });
    let payloads = sse_payloads(&body_text(harness.chat(&user_request("hi")).await).await);
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["choices"][0]["delta"]["content"], "partial");

    let mut request = user_request("hi");
    request["stream"] = json!(false);
    let response = harness.chat(&request).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response).await).expect("json body");
    assert_eq!(body["error"]["type"], "server_error");
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_idle_timeout_finishes_stream() {
    let hi = message_line("Hi");
    let script = format!("{}\nexec sleep 30", emit(&[&hi]));
    let harness = Harness::with_config(&script, |config| {
        config.generator.idle_timeout_secs = Some(1);
    });
    let payloads = sse_payloads(&body_text(harness.chat(&user_request("hi")).await).await);
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads[1]["choices"][0]["finish_reason"], "stop");
    assert!(payloads[2].is_null());
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_client_disconnect_cleans_up() {
    let hi = message_line("Hi");
    let script = format!("{}\nexec sleep 30", emit(&[&hi]));
    let harness = Harness::new(&script);

    let response = harness.chat(&user_request("hi")).await;
    let mut frames = response.into_body().into_data_stream();
    let first = frames.next().await.expect("first frame").expect("frame bytes");
    assert!(String::from_utf8_lossy(&first).contains("\"content\":\"Hi\""));
    assert_eq!(scratch_entries(harness.scratch.path()).len(), 1);
    drop(frames);

    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_invalid_body_is_rejected_before_spawn() {
    let capture = tempfile::tempdir().expect("capture dir");
    let marker = capture.path().join("spawned");
    let harness = Harness::new(&format!("touch '{}'", marker.display()));

    for body in [
        "not json".to_string(),
        json!({"model": "x"}).to_string(),
        json!({"messages": [{"content": "no role"}]}).to_string(),
    ] {
        let response = harness
            .send(
                Request::post("/v1/chat/completions")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload: Value = serde_json::from_str(&body_text(response).await).expect("json");
        assert_eq!(payload["error"]["type"], "invalid_request_error");
    }
    assert!(!marker.exists());
    assert!(scratch_entries(harness.scratch.path()).is_empty());
}

#[tokio::test]
async fn test_spawn_failure_is_server_error() {
    let harness = Harness::with_config("", |config| {
        config.generator.binary = "/nonexistent/gemini".to_string();
        config.generator.args.clear();
    });
    let response = harness.chat(&user_request("hi")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    harness.assert_scratch_empties().await;
}

#[tokio::test]
async fn test_body_limit() {
    let harness = Harness::with_config("cat > /dev/null", |config| {
        config.server.max_request_body_bytes = 64;
    });
    let response = harness.chat(&user_request(&"x".repeat(256))).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_models_health_and_fallback_routes() {
    let harness = Harness::new("true");

    let response = harness
        .send(Request::get("/").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Gemini CLI Proxy is running!");

    let response = harness
        .send(Request::get("/v1/models").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let models: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(models["object"], "list");
    let ids: Vec<&str> = models["data"]
        .as_array()
        .expect("data")
        .iter()
        .map(|m| m["id"].as_str().expect("id"))
        .collect();
    assert_eq!(
        ids,
        vec![
            "gemini-2.5-flash-lite",
            "gemini-2.5-pro",
            "gemini-2.5-flash",
            "gemini-3-flash-preview",
            "gemini-3-pro-preview"
        ]
    );
    assert!(models["data"]
        .as_array()
        .expect("data")
        .iter()
        .all(|m| m["owned_by"] == "google" && m["object"] == "model"));

    let response = harness
        .send(Request::get("/v1/chat/completions").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = harness
        .send(Request::get("/v1/unknown").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
