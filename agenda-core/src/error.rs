//! Error types for the agenda client.

use thiserror::Error;

/// HTTP status the backend uses when a relation is already in the requested state.
const STATUS_CONFLICT: u16 = 409;

/// Errors that can occur in agenda operations.
#[derive(Error, Debug)]
pub enum AgendaError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not authenticated: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AgendaError {
    /// Whether the user can reasonably retry (e.g. by tapping again).
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgendaError::Network(_))
    }

    /// The server rejected a mutation because the relation already holds.
    pub fn is_already_applied(&self) -> bool {
        matches!(self, AgendaError::Server { status, .. } if *status == STATUS_CONFLICT)
    }
}

/// Result type alias for agenda operations.
pub type AgendaResult<T> = Result<T, AgendaError>;
