use thiserror::Error;

/// Errors from the gateway socket and its authentication.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("socket error: {0}")]
    Io(String),

    #[error("connection closed by gateway")]
    Closed,

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("no bearer token available")]
    TokenUnavailable,
}

/// Errors from session repository calls (used by trait definitions in parley-core).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("unauthorized")]
    Unauthorized,
}

/// Errors surfaced by the chat session controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("session creation failed: {0}")]
    SessionCreation(String),

    #[error("chat session is not active")]
    NotActive,

    #[error("chat session closed")]
    Cancelled,
}
