//! Error types for HostDeck

use thiserror::Error;

/// Result type alias using HostDeck Error
pub type Result<T> = std::result::Result<T, Error>;

/// HostDeck error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("App already installed: {app_id}")]
    AlreadyInstalled { app_id: String },

    #[error("Container runtime error: {0}")]
    Runtime(String),

    #[error("Container runtime timed out after {seconds}s")]
    RuntimeTimeout { seconds: u64 },

    #[error("Telemetry collection failed: {0}")]
    Collection(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors caused by the request itself rather than the host.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::AlreadyInstalled { .. }
                | Error::Validation(_)
                | Error::InvalidStateTransition { .. }
        )
    }
}
