use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use std::io;
use std::time::Duration;

/// Everything that can go wrong between reading a target descriptor and
/// decoding the server's reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid server config: {0}")]
    ConfigParse(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("SRV resolution failed: {0}")]
    SrvResolution(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("timed out after {}ms", .0.as_millis())]
    ProbeTimeout(Duration),
    #[error("malformed response: {0}")]
    ProtocolParse(String),
    #[error("server not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigParse,
    InvalidRequest,
    InvalidAddress,
    SrvResolution,
    Connection,
    ProbeTimeout,
    ProtocolParse,
    NotFound,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigParse(_) => ErrorKind::ConfigParse,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Error::SrvResolution(_) => ErrorKind::SrvResolution,
            Error::Connection(_) => ErrorKind::Connection,
            Error::ProbeTimeout(_) => ErrorKind::ProbeTimeout,
            Error::ProtocolParse(_) => ErrorKind::ProtocolParse,
            Error::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Sorts a socket error into the probe taxonomy. Truncated reads mean the
    /// peer spoke something other than the expected protocol.
    pub fn from_io(context: &str, e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                Error::ProtocolParse(format!("{}: {}", context, e))
            }
            _ => Error::Connection(format!("{}: {}", context, e)),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Request-level failures surfaced by the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    InvalidAddress(String),
    Unauthorized,
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound(_) => ApiError::NotFound(e.to_string()),
            Error::InvalidRequest(_) | Error::InvalidAddress(_) => {
                ApiError::InvalidAddress(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, json!({ "error": msg, "online": false }))
            }
            ApiError::InvalidAddress(msg) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": msg,
                    "online": false,
                    "example": "127.0.0.1:25565 or 192.168.1.100:19132:bedrock"
                }),
            ),
            ApiError::Unauthorized => (StatusCode::FORBIDDEN, json!({ "error": "invalid token" })),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (body.0, axum::Json(body.1)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
