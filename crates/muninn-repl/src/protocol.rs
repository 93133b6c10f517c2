//! Wire protocol: one JSON object per line, UTF-8, `\n`-terminated.
//!
//! Three line shapes travel over stdout: a `Response` (matched by `id`), a
//! `CallbackRequest` (has `callback`), or neither (malformed). The supervisor
//! tells them apart by presence of the `callback` field, never by method name.

use serde::{Deserialize, Serialize};

/// A request sent to the REPL child on stdin.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: i64,
    pub method: String,
    pub params: serde_json::Value,
}

impl Request {
    pub fn new(id: i64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// A response read back from the REPL child on stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: i64,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// A callback initiated by the REPL child mid-`Execute`, answered by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackRequest {
    pub callback: String,
    pub callback_id: i64,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The host's answer to a `CallbackRequest`, written back to the child's stdin.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CallbackResponse {
    pub callback_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackResponse {
    pub fn ok(callback_id: i64, result: impl Into<String>) -> Self {
        Self {
            callback_id,
            result: Some(result.into()),
            ..Default::default()
        }
    }

    pub fn ok_many(callback_id: i64, results: Vec<String>) -> Self {
        Self {
            callback_id,
            results: Some(results),
            ..Default::default()
        }
    }

    pub fn err(callback_id: i64, error: impl Into<String>) -> Self {
        Self {
            callback_id,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// A line read from the child's stdout, classified by shape.
///
/// Classification looks only at which fields are present, per spec: presence
/// of `callback` means a callback request, otherwise it is a response keyed
/// by `id`. Anything matching neither shape is `Malformed`.
#[derive(Debug, Clone)]
pub enum IncomingLine {
    Response(Response),
    Callback(CallbackRequest),
    Malformed(String),
}

pub fn classify_line(line: &str) -> IncomingLine {
    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return IncomingLine::Malformed(line.to_string()),
    };

    if value.get("callback").is_some() {
        match serde_json::from_value::<CallbackRequest>(value) {
            Ok(cb) => IncomingLine::Callback(cb),
            Err(_) => IncomingLine::Malformed(line.to_string()),
        }
    } else {
        match serde_json::from_value::<Response>(value) {
            Ok(resp) => IncomingLine::Response(resp),
            Err(_) => IncomingLine::Malformed(line.to_string()),
        }
    }
}

/// JSON-RPC-style error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Parse,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    Internal,
    ExecutionTimeout,
    SandboxViolation,
    MemoryLimit,
}

impl ErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::Parse => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::Internal => -32603,
            ErrorCode::ExecutionTimeout => -32000,
            ErrorCode::SandboxViolation => -32001,
            ErrorCode::MemoryLimit => -32002,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_response_by_id() {
        let line = r#"{"id": 1, "result": {"ok": true}}"#;
        match classify_line(line) {
            IncomingLine::Response(r) => {
                assert_eq!(r.id, 1);
                assert!(r.error.is_none());
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn classifies_callback_by_presence_of_callback_field() {
        let line = r#"{"callback": "llm_call", "callback_id": 7, "params": {"prompt": "hi"}}"#;
        match classify_line(line) {
            IncomingLine::Callback(cb) => {
                assert_eq!(cb.callback, "llm_call");
                assert_eq!(cb.callback_id, 7);
            }
            _ => panic!("expected callback"),
        }
    }

    #[test]
    fn malformed_line_is_neither() {
        match classify_line("not json at all") {
            IncomingLine::Malformed(_) => {}
            _ => panic!("expected malformed"),
        }
    }

    #[test]
    fn response_with_error_carries_code() {
        let line = r#"{"id": 2, "error": {"code": -32000, "message": "timeout"}}"#;
        match classify_line(line) {
            IncomingLine::Response(r) => {
                assert_eq!(r.error.unwrap().code, ErrorCode::ExecutionTimeout.code());
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn error_code_table_matches_spec() {
        assert_eq!(ErrorCode::Parse.code(), -32700);
        assert_eq!(ErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::InvalidParams.code(), -32602);
        assert_eq!(ErrorCode::Internal.code(), -32603);
        assert_eq!(ErrorCode::ExecutionTimeout.code(), -32000);
        assert_eq!(ErrorCode::SandboxViolation.code(), -32001);
        assert_eq!(ErrorCode::MemoryLimit.code(), -32002);
    }
}
