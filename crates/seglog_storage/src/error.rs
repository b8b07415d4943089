//! Error types for storage operations.

use seglog_chunk::ChunkError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur on the segment read path.
///
/// "Nothing to read yet" is not an error; it is reported as
/// [`crate::ReadOutcome::Empty`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An open, seek or read failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The segment file does not exist.
    #[error("segment not found: {}", path.display())]
    SegmentNotFound {
        /// Path that was opened.
        path: PathBuf,
    },

    /// A fully buffered chunk header violates the layout.
    #[error("chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// The read was canceled before it completed.
    #[error("read canceled")]
    Canceled,

    /// The caller passed arguments that can never be served.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The datalog configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of a read failure, used to pick a retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// The segment does not exist on this node.
    NotFound,
    /// The storage device failed; another replica may succeed.
    Io,
    /// The request was canceled by its owner.
    Canceled,
    /// The segment contents are damaged.
    Corrupt,
    /// The request itself was malformed.
    InvalidArgument,
}

impl StorageError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the failure class of this error.
    #[must_use]
    pub fn failure_kind(&self) -> FetchFailure {
        match self {
            StorageError::Io(_) => FetchFailure::Io,
            StorageError::SegmentNotFound { .. } => FetchFailure::NotFound,
            StorageError::Chunk(_) => FetchFailure::Corrupt,
            StorageError::Canceled => FetchFailure::Canceled,
            StorageError::InvalidArgument(_) | StorageError::Config(_) => {
                FetchFailure::InvalidArgument
            }
        }
    }

    /// Returns true if reading from another replica could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.failure_kind(),
            FetchFailure::Io | FetchFailure::NotFound | FetchFailure::Corrupt
        )
    }
}
