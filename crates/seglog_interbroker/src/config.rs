//! Configuration for interbroker connections.

use crate::frame::{FrameCodec, DEFAULT_MAX_BODY_LENGTH};

/// Default depth of the queue between a replica connection and its local
/// appender.
pub const DEFAULT_APPEND_QUEUE_DEPTH: usize = 64;

/// Configuration for interbroker connections.
#[derive(Debug, Clone)]
pub struct InterbrokerConfig {
    /// Largest frame body accepted from a peer.
    pub max_body_length: usize,
    /// Requests queued for the local appender before the connection
    /// stops reading. Zero is treated as one.
    pub append_queue_depth: usize,
}

impl InterbrokerConfig {
    /// Creates a configuration with default limits.
    pub fn new() -> Self {
        Self {
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
            append_queue_depth: DEFAULT_APPEND_QUEUE_DEPTH,
        }
    }

    /// Sets the largest accepted frame body.
    pub fn with_max_body_length(mut self, len: usize) -> Self {
        self.max_body_length = len;
        self
    }

    /// Sets the appender queue depth.
    pub fn with_append_queue_depth(mut self, depth: usize) -> Self {
        self.append_queue_depth = depth;
        self
    }

    /// Builds a frame codec enforcing the body limit.
    pub fn codec(&self) -> FrameCodec {
        FrameCodec::with_max_body_length(self.max_body_length)
    }
}

impl Default for InterbrokerConfig {
    fn default() -> Self {
        Self::new()
    }
}
