use thiserror::Error;

use polyrpc_codec::{Fault, NetstringError, ResponseError};

/// Client-side call failures. A fault raised by the server is its own
/// variant so callers can branch on `code`/`message`; everything else is a
/// protocol or transport problem.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),
}

impl From<ResponseError> for ClientError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Fault(fault) => ClientError::Fault(fault),
            ResponseError::Protocol(message) => ClientError::Protocol(message),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl From<NetstringError> for ClientError {
    fn from(err: NetstringError) -> Self {
        ClientError::Transport(err.to_string())
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
