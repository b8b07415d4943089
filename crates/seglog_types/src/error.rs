//! Error type for collaborator calls.

use thiserror::Error;

/// Result type for collaborator operations.
pub type CollabResult<T> = Result<T, CollabError>;

/// Errors surfaced by external collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollabError {
    /// The collaborator could not be reached or is not initialized.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The collaborator rejected the call.
    #[error("collaborator rejected request: {0}")]
    Rejected(String),
}

impl CollabError {
    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Creates a rejected error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}
