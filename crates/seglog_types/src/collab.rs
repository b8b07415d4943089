//! Contracts consumed from the rest of the broker.
//!
//! The storage and replication core never owns generation management or
//! metadata persistence. It reaches them only through these traits, so
//! tests can substitute in-memory fakes.

use crate::error::CollabResult;
use crate::types::{Generation, RangeIndex, Token};

/// Looks up generation descriptors by token.
pub trait GenerationSource: Send + Sync {
    /// Returns the known generations of the range starting at `token`,
    /// most recent first.
    fn generations_by_token(&self, token: Token) -> CollabResult<Vec<Generation>>;
}

/// Local metadata persistence (offsets and generation commit records).
pub trait LocalMetadata: GenerationSource {
    /// Prepares the underlying store.
    fn init(&self) -> CollabResult<()>;

    /// Returns whether the store was created by the last [`LocalMetadata::init`].
    fn was_newly_created(&self) -> bool;

    /// Persists a consumer group offset.
    fn save_offset(
        &self,
        group: &str,
        topic: &str,
        token: Token,
        range_index: RangeIndex,
        value: i64,
    ) -> CollabResult<()>;

    /// Persists a generation as committed.
    fn commit_generation(&self, generation: &Generation) -> CollabResult<()>;
}
