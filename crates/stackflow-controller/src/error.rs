//! Environment controller error types

use thiserror::Error;

/// Environment controller errors
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Throttled: {0}")]
    Throttled(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Fatal: {0}")]
    Fatal(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("State file error: {0}")]
    State(String),

    #[error("Lock acquisition failed: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ControllerError {
    /// Whether retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled(_) | Self::Transient(_) | Self::Lock(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
