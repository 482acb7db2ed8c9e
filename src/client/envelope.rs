//! JSON-RPC 2.0 wire envelope encoding and decoding.
//!
//! One message per line, no embedded newlines. Requests carry an `id` and are
//! answered by exactly one response; notifications carry no `id` and are
//! never answered. Decoding is purely a parsing concern: it distinguishes
//! success payloads from error payloads from malformed input, and performs no
//! semantic validation of a `result`'s shape — that belongs to callers.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{AppError, Result};

/// Protocol identifier carried on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Encode a request envelope as a single wire line (no trailing newline).
#[must_use]
pub fn encode_request(id: i64, method: &str, params: &Value) -> String {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

/// Encode a notification envelope — same shape as a request but without an
/// `id` field. Notifications never receive a response.
#[must_use]
pub fn encode_notification(method: &str, params: Option<&Value>) -> String {
    match params {
        Some(params) => json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
        })
        .to_string(),
        None => json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
        })
        .to_string(),
    }
}

/// A structured error returned by the server for a single request.
///
/// This is legitimate protocol output, not a local failure: it reaches the
/// caller through the same return channel as a success, tagged by variant
/// ([`CallOutcome::Remote`]).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteError {
    /// Numeric JSON-RPC error code (e.g. `-32601` for an unknown method).
    pub code: i64,
    /// Human-readable error description.
    pub message: String,
    /// Optional structured detail payload.
    #[serde(default)]
    pub data: Option<Value>,
}

/// Success-or-error half of a decoded response line.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// The `result` member — the call succeeded.
    Success(Value),
    /// The `error` member — the server rejected the call.
    Error(RemoteError),
}

/// A decoded response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    /// Correlation id. Absent only on id-less server error responses.
    pub id: Option<i64>,
    /// Success or error payload.
    pub outcome: ResponseOutcome,
}

/// Final outcome of a completed tool call.
///
/// Both variants travel the success path: a remote error is a normal,
/// structured answer and must never poison the session.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// The server executed the tool and returned its result payload.
    Success(Value),
    /// The server answered with a well-formed error response.
    Remote(RemoteError),
}

/// One tool descriptor from a `tools/list` result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name used in `tools/call` requests.
    pub name: String,
    /// Human-readable description, when the server provides one.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema for the tool's arguments, when the server provides one.
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<Value>,
}

/// Decode one response line into a [`WireResponse`].
///
/// # Errors
///
/// [`AppError::Decode`] when the line is empty or whitespace, is not valid
/// JSON, is not a JSON object, carries a malformed `error` member, or lacks
/// both `result` and `error`.
pub fn decode_response(line: &str) -> Result<WireResponse> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(AppError::Decode("empty response line".into()));
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| AppError::Decode(format!("malformed json: {e}")))?;

    let Some(object) = value.as_object() else {
        return Err(AppError::Decode("response is not a json object".into()));
    };

    let id = object.get("id").and_then(Value::as_i64);

    if let Some(result) = object.get("result") {
        return Ok(WireResponse {
            id,
            outcome: ResponseOutcome::Success(result.clone()),
        });
    }

    if let Some(error) = object.get("error") {
        let remote: RemoteError = serde_json::from_value(error.clone())
            .map_err(|e| AppError::Decode(format!("malformed error member: {e}")))?;
        return Ok(WireResponse {
            id,
            outcome: ResponseOutcome::Error(remote),
        });
    }

    Err(AppError::Decode(
        "response carries neither result nor error".into(),
    ))
}

/// Parse a `tools/list` result payload into tool descriptors.
///
/// # Errors
///
/// [`AppError::Decode`] when the payload lacks a `tools` array or a
/// descriptor is missing its `name`.
pub fn parse_tool_list(result: &Value) -> Result<Vec<ToolDescriptor>> {
    #[derive(Deserialize)]
    struct ToolListResult {
        tools: Vec<ToolDescriptor>,
    }

    let parsed: ToolListResult = serde_json::from_value(result.clone())
        .map_err(|e| AppError::Decode(format!("malformed tools/list result: {e}")))?;
    Ok(parsed.tools)
}
