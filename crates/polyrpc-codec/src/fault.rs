use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// A JSON-RPC fault: the application/protocol error value that travels on
/// the wire. Round-trips through all three envelope generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl Fault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The pre-1.0/1.0 fault object: `{"fault": "Fault", ...}`.
    pub(crate) fn to_legacy_object(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("fault".to_string(), Value::from("Fault"));
        map.insert("faultCode".to_string(), Value::from(self.code));
        map.insert("faultString".to_string(), Value::from(self.message.clone()));
        Value::Object(map)
    }

    /// The 2.0 error object: `{"message": ..., "code": ..., "data": ""}`.
    pub(crate) fn to_v2_object(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("message".to_string(), Value::from(self.message.clone()));
        map.insert("code".to_string(), Value::from(self.code));
        map.insert("data".to_string(), Value::from(""));
        Value::Object(map)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fault {}: {}", self.code, self.message)
    }
}

impl std::error::Error for Fault {}

/// Request decoding errors. These are protocol errors, fatal to the request
/// that carried them but never to the connection.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::MalformedRequest(err.to_string())
    }
}

/// Client-side response decoding outcome: a fault raised by the server is
/// distinguishable from a response we simply could not understand.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("malformed response: {0}")]
    Protocol(String),
}

/// Error codes carried over from the JSON-RPC 2.0 specification.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Fault code raised when the auth capability denies a call.
    pub const UNAUTHORIZED: i64 = 4000;
}
