use serde_json::Value;

use crate::error::ProxyError;
use crate::protocol::canonical::{CanonicalRequest, ToolDefinition, ToolParameter, TranscodeMode};

use super::{OpenAiChatRequest, OpenAiTool};

const DEFAULT_PARAMETER_TYPE: &str = "string";

/// Parse a raw request body into the wire request.
///
/// # Errors
///
/// Returns [`ProxyError::InvalidRequest`] carrying the deserializer's message
/// when the body is not JSON or does not match the request schema.
pub fn parse_openai_chat_request_wire(body: &[u8]) -> Result<OpenAiChatRequest, ProxyError> {
    serde_json::from_slice(body)
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid request body: {e}")))
}

/// Decode a wire request into the canonical request.
///
/// `default_model` is used when the client omits `model`.
#[must_use]
pub fn decode_openai_chat_request(
    request: OpenAiChatRequest,
    default_model: &str,
) -> CanonicalRequest {
    let OpenAiChatRequest {
        model,
        messages,
        stream,
        tools,
        tool_choice: _,
    } = request;

    let tools: Vec<ToolDefinition> = tools
        .unwrap_or_default()
        .iter()
        .map(decode_tool)
        .collect();
    let mode = TranscodeMode::for_tools(&tools);

    CanonicalRequest {
        model: model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| default_model.to_string()),
        stream: stream.unwrap_or(true),
        messages,
        tools,
        mode,
    }
}

/// Parse and decode in one step.
///
/// # Errors
///
/// Returns [`ProxyError::InvalidRequest`] when the body fails validation.
pub fn decode_openai_chat_body(
    body: &[u8],
    default_model: &str,
) -> Result<CanonicalRequest, ProxyError> {
    let wire = parse_openai_chat_request_wire(body)?;
    Ok(decode_openai_chat_request(wire, default_model))
}

fn decode_tool(tool: &OpenAiTool) -> ToolDefinition {
    let function = &tool.function;
    let parameters = function.parameters.as_ref();
    let properties = parameters.and_then(|p| p.get("properties"));

    let required_parameters = parameters
        .and_then(|p| p.get("required"))
        .and_then(Value::as_array)
        .map(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .map(|name| ToolParameter {
                    name: name.to_string(),
                    type_hint: parameter_type_hint(properties.and_then(|p| p.get(name))),
                })
                .collect()
        })
        .unwrap_or_default();

    ToolDefinition {
        name: function.name.clone(),
        description: function.description.clone().unwrap_or_default(),
        required_parameters,
    }
}

fn parameter_type_hint(schema: Option<&Value>) -> String {
    match schema.and_then(|s| s.get("type")) {
        None | Some(Value::Null) => DEFAULT_PARAMETER_TYPE.to_string(),
        Some(Value::String(ty)) => ty.clone(),
        Some(other) => other.to_string(),
    }
}
