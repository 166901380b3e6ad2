//! Error types, HTTP response conversion, and wire-protocol error mapping

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate-wide error type.
///
/// Every variant maps to both an HTTP response (for the thin discovery
/// surface) and a wire `error{code, message}` frame (for the WebSocket
/// connection handler) via [`Error::wire_code`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration failed to load or validate
    #[error("configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Persistence layer failure (connection, query, pool exhaustion)
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Token signature or claims failed verification
    #[error("token verification failed: {0}")]
    Jwt(Box<jsonwebtoken::errors::Error>),

    /// A handshake token was well-formed but expired or otherwise rejected
    #[error("auth error: {0}")]
    AuthFailed(String),

    /// Socket sent a frame that does not decode to a known message
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Room id or slug does not resolve to a known room
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// Command requires an attached room but the socket has none
    #[error("not in a room")]
    NotInRoom,

    /// Move target is out of bounds, blocked, or unreachable
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// Per-connection command rate ceiling was exceeded
    #[error("rate limited")]
    RateLimited,

    /// I/O failure (socket, config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for unexpected internal failures
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// HTTP error response body for the thin discovery surface (§10.6)
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub status: u16,
}

impl ErrorResponse {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.to_string(),
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            Error::Config(_) | Error::Internal(_) | Error::Persistence(_) | Error::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            Error::Jwt(_) | Error::AuthFailed(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            Error::InvalidMessage(_) => (StatusCode::BAD_REQUEST, "INVALID_MESSAGE"),
            Error::RoomNotFound(_) => (StatusCode::NOT_FOUND, "ROOM_NOT_FOUND"),
            Error::NotInRoom => (StatusCode::BAD_REQUEST, "NOT_IN_ROOM"),
            Error::InvalidMove(_) => (StatusCode::BAD_REQUEST, "INVALID_MOVE"),
            Error::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
        };

        tracing::error!(error = %self, code, "request failed");
        (status, Json(ErrorResponse::new(status, code, self.to_string()))).into_response()
    }
}

/// The `code` field of a wire `error{code, message}` frame (§6.1, §7).
///
/// Unlike [`IntoResponse`], this never closes or degrades the connection —
/// the propagation policy in §7 treats every engine-side error as local to
/// the command that triggered it.
impl Error {
    pub fn wire_code(&self) -> &'static str {
        match self {
            Error::InvalidMessage(_) => "INVALID_MESSAGE",
            Error::RoomNotFound(_) => "ROOM_NOT_FOUND",
            Error::NotInRoom => "NOT_IN_ROOM",
            Error::InvalidMove(_) => "INVALID_MOVE",
            Error::RateLimited => "RATE_LIMITED",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(Box::new(e))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for Error {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Error::Jwt(Box::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_code_maps_validation_errors() {
        assert_eq!(
            Error::InvalidMove("blocked".into()).wire_code(),
            "INVALID_MOVE"
        );
        assert_eq!(Error::NotInRoom.wire_code(), "NOT_IN_ROOM");
        assert_eq!(Error::RateLimited.wire_code(), "RATE_LIMITED");
    }

    #[test]
    fn wire_code_defaults_internal_errors_to_internal() {
        assert_eq!(Error::Internal("boom".into()).wire_code(), "INTERNAL_ERROR");
        assert_eq!(
            Error::Persistence("pool exhausted".into()).wire_code(),
            "INTERNAL_ERROR"
        );
    }
}
