//! Error types for the chunk codec.

use crate::header::HEADER_SIZE;
use thiserror::Error;

/// Result type for chunk codec operations.
pub type ChunkResult<T> = Result<T, ChunkError>;

/// Errors that can occur while encoding or decoding chunks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// Fewer than [`HEADER_SIZE`] bytes were available.
    ///
    /// On the read path this means "header not yet fully buffered", not a
    /// parse failure.
    #[error("corrupt header: need {} bytes, {available} available", HEADER_SIZE)]
    CorruptHeader {
        /// Bytes that were available.
        available: usize,
    },

    /// A fully buffered header violates the fixed layout.
    #[error("invalid chunk header: {reason}")]
    InvalidHeader {
        /// What was wrong with the header.
        reason: String,
    },

    /// The header decoded but its body is not fully present.
    #[error("truncated chunk: need {needed} bytes, {available} available")]
    Truncated {
        /// Bytes needed for header and body.
        needed: usize,
        /// Bytes that were available.
        available: usize,
    },

    /// The body does not fit the 32-bit length field.
    #[error("chunk body too large: {len} bytes")]
    BodyTooLarge {
        /// Length of the rejected body.
        len: usize,
    },
}

impl ChunkError {
    /// Creates an invalid header error.
    pub fn invalid_header(reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            reason: reason.into(),
        }
    }

    /// Returns true if the error only means more bytes are needed.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::CorruptHeader { .. } | Self::Truncated { .. })
    }
}
