//! Core identifier types.

use std::fmt;

/// Ownership token of a topic-partition range on the ring.
///
/// Tokens are signed 64-bit positions; the routing layer decides which
/// broker owns which token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub i64);

impl Token {
    /// Creates a new token.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw token value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generation id (epoch) of a token range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GenId(pub u32);

impl GenId {
    /// Creates a new generation id.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw generation value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for GenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a segment file within a topic-partition directory.
///
/// By convention this is the logical offset of the first record written
/// to the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SegmentId(pub i64);

impl SegmentId {
    /// Creates a new segment id.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw segment id.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a consumer range within a token range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RangeIndex(pub u8);

/// Identifies one topic-partition shard: topic name, owning token and
/// generation.
///
/// Used as the lookup key for directory and file resolution. Immutable
/// once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicDataId {
    name: String,
    token: Token,
    gen_id: GenId,
}

impl TopicDataId {
    /// Creates a new topic data id.
    pub fn new(name: impl Into<String>, token: Token, gen_id: GenId) -> Self {
        Self {
            name: name.into(),
            token,
            gen_id,
        }
    }

    /// Returns the topic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the owning token.
    #[must_use]
    pub const fn token(&self) -> Token {
        self.token
    }

    /// Returns the generation id.
    #[must_use]
    pub const fn gen_id(&self) -> GenId {
        self.gen_id
    }
}

impl fmt::Display for TopicDataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.name, self.token, self.gen_id)
    }
}

/// Lifecycle status of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenStatus {
    /// Proposed by a leader, not yet accepted.
    #[default]
    Proposed,
    /// Accepted by the followers.
    Accepted,
    /// Committed and serving traffic.
    Committed,
}

/// A generation descriptor for a token range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// First token of the range (inclusive).
    pub start: Token,
    /// Last token of the range.
    pub end: Token,
    /// Generation version.
    pub version: GenId,
    /// Ordinal of the leader broker.
    pub leader: u32,
    /// Ordinals of the follower brokers.
    pub followers: Vec<u32>,
    /// Lifecycle status.
    pub status: GenStatus,
}

impl Generation {
    /// Returns whether `ordinal` is the leader or a follower of this generation.
    #[must_use]
    pub fn is_replica(&self, ordinal: u32) -> bool {
        self.leader == ordinal || self.followers.contains(&ordinal)
    }
}
