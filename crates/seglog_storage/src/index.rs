//! Best-effort sparse offset index lookup.
//!
//! An index file sits next to its segment and holds fixed-size entries
//! sorted by offset:
//!
//! ```text
//! | offset (i64 BE) | position (u64 BE) | ...
//! ```
//!
//! A position is the byte offset in the segment file of the chunk run
//! holding `offset`. Lookups never fail: any miss means "scan from the
//! start of the segment".

use crate::config::index_file_name;
use bytes::{Buf, BufMut};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{trace, warn};

/// Encoded size of one index entry.
pub const INDEX_ENTRY_SIZE: usize = 16;

/// One sparse index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Logical offset.
    pub offset: i64,
    /// Byte position in the segment file.
    pub position: u64,
}

impl IndexEntry {
    /// Creates an entry.
    #[must_use]
    pub const fn new(offset: i64, position: u64) -> Self {
        Self { offset, position }
    }

    /// Writes the entry.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_i64(self.offset);
        buf.put_u64(self.position);
    }

    /// Reads an entry from the first [`INDEX_ENTRY_SIZE`] bytes of `data`.
    #[must_use]
    pub fn decode(mut data: &[u8]) -> Option<Self> {
        if data.len() < INDEX_ENTRY_SIZE {
            return None;
        }
        Some(Self {
            offset: data.get_i64(),
            position: data.get_u64(),
        })
    }
}

/// Returns the segment file position to start reading `offset` from.
///
/// Picks the last entry whose offset is at or below `offset`. Returns 0 if
/// the index file is missing, unreadable, empty, or has no such entry.
#[must_use]
pub fn try_read_index_file(base: &Path, segment_id: i64, offset: i64) -> u64 {
    let path = base.join(index_file_name(segment_id));
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            trace!(path = %path.display(), "no index file, scanning from segment start");
            return 0;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read index file");
            return 0;
        }
    };

    if data.len() % INDEX_ENTRY_SIZE != 0 {
        warn!(
            path = %path.display(),
            len = data.len(),
            "index file has a partial trailing entry, ignoring it"
        );
    }

    let position = lookup(&data, offset).map_or(0, |entry| entry.position);
    trace!(path = %path.display(), offset, position, "index lookup");
    position
}

/// Binary search over encoded entries for the last one at or below `offset`.
fn lookup(data: &[u8], offset: i64) -> Option<IndexEntry> {
    let count = data.len() / INDEX_ENTRY_SIZE;
    let entry_at = |i: usize| IndexEntry::decode(&data[i * INDEX_ENTRY_SIZE..]);

    let (mut lo, mut hi) = (0, count);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if entry_at(mid)?.offset <= offset {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    if lo == 0 {
        return None;
    }
    entry_at(lo - 1)
}
