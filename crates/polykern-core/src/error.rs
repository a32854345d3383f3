//! Shared error type across polykern crates.

use thiserror::Error;

/// Stable error codes used in logs, metric labels, and NACK details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    InvalidParams,
    InvalidConfig,
    Decode,
    Transport,
    Timeout,
    Cancelled,
    RouteNotFound,
    Policy,
    Internal,
}

impl ErrorCode {
    /// String representation used in structured fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
            ErrorCode::Decode => "DECODE",
            ErrorCode::Transport => "TRANSPORT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::RouteNotFound => "ROUTE_NOT_FOUND",
            ErrorCode::Policy => "POLICY",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, PolykernError>;

/// Unified error type used by core and engine.
#[derive(Debug, Error)]
pub enum PolykernError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("cancelled")]
    Cancelled,
    #[error("no policy chain for route: {0}")]
    RouteNotFound(String),
    #[error("policy {name} failed: {reason}")]
    Policy { name: String, reason: String },
    #[error("internal: {0}")]
    Internal(String),
}

impl PolykernError {
    /// Map the error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            PolykernError::NotFound(_) => ErrorCode::NotFound,
            PolykernError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            PolykernError::InvalidParams(_) => ErrorCode::InvalidParams,
            PolykernError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            PolykernError::Decode(_) => ErrorCode::Decode,
            PolykernError::Transport(_) => ErrorCode::Transport,
            PolykernError::Timeout(_) => ErrorCode::Timeout,
            PolykernError::Cancelled => ErrorCode::Cancelled,
            PolykernError::RouteNotFound(_) => ErrorCode::RouteNotFound,
            PolykernError::Policy { .. } => ErrorCode::Policy,
            PolykernError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Transport-class errors end the current stream and trigger a reconnect.
    pub fn is_transport(&self) -> bool {
        matches!(self, PolykernError::Transport(_) | PolykernError::Timeout(_))
    }
}
