//! Error types for interbroker framing and request handling.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for frame encoding and decoding.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Result type for request lifecycle operations.
pub type RequestResult<T> = Result<T, RequestError>;

/// Errors raised while decoding or encoding frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Fewer bytes than the layout requires.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Opcode byte outside the known set.
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),

    /// Version byte other than the supported protocol version.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Topic name longer than its length byte can express.
    #[error("topic name too long: {len} bytes")]
    TopicTooLong {
        /// Length of the rejected name.
        len: usize,
    },

    /// Topic bytes are not valid UTF-8.
    #[error("topic name is not valid UTF-8")]
    InvalidTopic,

    /// Body longer than the 32-bit length field allows.
    #[error("frame body too large: {len} bytes")]
    BodyTooLarge {
        /// Length of the rejected body.
        len: usize,
    },

    /// Advertised body length above the configured limit.
    #[error("frame body of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Advertised length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// A frame arrived on the wrong side of the connection.
    #[error("unexpected opcode {0:?}")]
    UnexpectedOpcode(crate::Opcode),

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// Creates a truncation error.
    pub fn truncated(needed: usize, available: usize) -> Self {
        Self::Truncated { needed, available }
    }
}

/// Errors surfaced by the request lifecycle.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The request's cancellation token fired before a result arrived.
    #[error("request canceled")]
    Canceled,

    /// The connection went away before the request was resolved.
    #[error("connection closed")]
    ConnectionClosed,

    /// The result was already taken from this handle.
    #[error("request already resolved")]
    AlreadyResolved,

    /// Every stream id is taken by an outstanding request.
    #[error("too many requests in flight")]
    TooManyInFlight,

    /// Lifecycle transition not allowed from the current state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The local append failed.
    #[error("append failed: {0}")]
    Append(String),

    /// The peer answered with an error response.
    #[error("remote error: {0}")]
    Remote(String),

    /// Frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl RequestError {
    /// Creates an invalid state transition error.
    pub fn invalid_transition(from: impl fmt::Debug, to: impl fmt::Debug) -> Self {
        Self::InvalidStateTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }

    /// Returns true if resending the request on a fresh connection may
    /// succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed | Self::TooManyInFlight | Self::Remote(_)
        )
    }
}
