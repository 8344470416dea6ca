//! Line framing for the worker protocol.
//!
//! Every frame is a single JSON object terminated by `\n`. Requests carry
//! `jsonrpc`, `id`, `method` and `params`; responses echo the `id` with either
//! a `result` or an `error` member.

use serde_json::{Value, json};

const JSONRPC_VERSION: &str = "2.0";

/// A classified line read from the worker's primary output.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum InboundMessage {
    /// Successful answer to one of our requests.
    Response { id: u64, result: Value },
    /// Error answer to one of our requests.
    Failure {
        id: u64,
        code: Option<i64>,
        message: String,
    },
    /// The worker is asking us something.
    Request { id: Value, method: String },
    /// One-way message from the worker.
    Notification { method: String },
    /// Anything that is not a protocol frame.
    Unclassified { reason: &'static str },
}

pub(crate) fn encode_request(id: u64, method: &str, params: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "method": method,
        "params": params,
    }))
}

pub(crate) fn encode_result(id: Value, result: Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "result": result,
    }))
}

pub(crate) fn encode_error(id: Value, code: i64, message: &str) -> Result<String, serde_json::Error> {
    serde_json::to_string(&json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message },
    }))
}

pub(crate) fn classify(line: &str) -> InboundMessage {
    let trimmed = line.trim();
    if trimmed.starts_with('\u{1b}') {
        return InboundMessage::Unclassified {
            reason: "ansi escape sequence",
        };
    }
    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => {
            return InboundMessage::Unclassified {
                reason: "not json",
            };
        }
    };
    let Some(object) = value.as_object() else {
        return InboundMessage::Unclassified {
            reason: "not a json object",
        };
    };

    if let Some(method) = object.get("method").and_then(Value::as_str) {
        return match object.get("id") {
            Some(id) if !id.is_null() => InboundMessage::Request {
                id: id.clone(),
                method: method.to_string(),
            },
            _ => InboundMessage::Notification {
                method: method.to_string(),
            },
        };
    }

    let Some(id) = object.get("id").and_then(parse_id) else {
        return InboundMessage::Unclassified {
            reason: "missing correlation id",
        };
    };

    match object.get("error") {
        Some(error) if !error.is_null() => {
            let (code, message) = error_detail(error);
            InboundMessage::Failure { id, code, message }
        }
        _ => match object.get("result") {
            Some(result) => InboundMessage::Response {
                id,
                result: result.clone(),
            },
            None => InboundMessage::Unclassified {
                reason: "neither result nor error",
            },
        },
    }
}

fn parse_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn error_detail(error: &Value) -> (Option<i64>, String) {
    match error {
        Value::String(text) => (None, text.clone()),
        Value::Object(map) => {
            let code = map.get("code").and_then(Value::as_i64);
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            (code, message)
        }
        other => (None, other.to_string()),
    }
}
