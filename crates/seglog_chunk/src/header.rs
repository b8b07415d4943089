//! Chunk header layout.

use crate::error::{ChunkError, ChunkResult};
use bytes::{Buf, BufMut};

/// Encoded size of a chunk header.
///
/// flags (1) + body_length (4) + start (8) + record_length (4) = 17 bytes
pub const HEADER_SIZE: usize = 1 + 4 + 8 + 4;

/// Sentinel byte used to pad segment files up to an alignment boundary.
///
/// Padding bytes only ever appear immediately before a chunk header. A
/// header's flags byte never has this bit set, so a run of padding can be
/// told apart from a header by its first byte.
pub const ALIGNMENT_FLAG: u8 = 0x80;

/// Default direct I/O alignment in bytes.
pub const DEFAULT_ALIGNMENT_SIZE: usize = 512;

/// Header that prefixes every chunk body.
///
/// All fields are big-endian on disk and on the wire. There is no
/// checksum in this format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Reserved chunk flags. The [`ALIGNMENT_FLAG`] bit must be clear.
    pub flags: u8,
    /// Length in bytes of the body that follows the header.
    pub body_length: u32,
    /// Logical offset of the first record in the chunk.
    pub start: i64,
    /// Number of records contained in the chunk.
    pub record_length: u32,
}

impl ChunkHeader {
    /// Creates a header with no flags set.
    #[must_use]
    pub const fn new(start: i64, record_length: u32, body_length: u32) -> Self {
        Self {
            flags: 0,
            body_length,
            start,
            record_length,
        }
    }

    /// Logical offset one past the last record in the chunk.
    #[must_use]
    pub const fn end(&self) -> i64 {
        self.start.saturating_add(self.record_length as i64)
    }

    /// Returns whether `offset` falls in `[start, start + record_length)`.
    #[must_use]
    pub const fn contains(&self, offset: i64) -> bool {
        offset >= self.start && offset < self.end()
    }

    /// Length of header plus body.
    #[must_use]
    pub const fn chunk_len(&self) -> usize {
        HEADER_SIZE + self.body_length as usize
    }

    /// Writes the header in its fixed layout.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.flags);
        buf.put_u32(self.body_length);
        buf.put_i64(self.start);
        buf.put_u32(self.record_length);
    }

    /// Returns the encoded header bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut slice = &mut out[..];
        self.encode(&mut slice);
        out
    }
}

/// Decodes a header from the first [`HEADER_SIZE`] bytes of `data`.
///
/// Never reads past `data`.
///
/// # Errors
///
/// - [`ChunkError::CorruptHeader`] if fewer than [`HEADER_SIZE`] bytes are
///   available. Callers on the read path treat this as "wait for more bytes".
/// - [`ChunkError::InvalidHeader`] if the flags byte carries the padding bit
///   or the record count is zero.
pub fn decode_header(data: &[u8]) -> ChunkResult<ChunkHeader> {
    if data.len() < HEADER_SIZE {
        return Err(ChunkError::CorruptHeader {
            available: data.len(),
        });
    }

    let mut buf = &data[..HEADER_SIZE];
    let header = ChunkHeader {
        flags: buf.get_u8(),
        body_length: buf.get_u32(),
        start: buf.get_i64(),
        record_length: buf.get_u32(),
    };

    if header.flags & ALIGNMENT_FLAG != 0 {
        return Err(ChunkError::invalid_header(format!(
            "flags byte {:#04x} overlaps the alignment marker",
            header.flags
        )));
    }
    if header.record_length == 0 {
        return Err(ChunkError::invalid_header(format!(
            "chunk at offset {} holds zero records",
            header.start
        )));
    }

    Ok(header)
}
