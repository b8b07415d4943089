//! The physical read loop: aligned reads into a buffer, partial chunk
//! carry-over and scanning.

use crate::config::{align_down, align_up};
use crate::error::{StorageError, StorageResult};
use crate::reader::{scan, Scan};
use crate::store::ReadOutcome;
use bytes::Bytes;
use std::io::{self, Read};
use std::ops::{DerefMut, Range};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A read buffer plus the window of it holding valid bytes.
///
/// Bytes in `buffer[start..end]` were read from the file (or carried over
/// from an earlier read); the next physical read appends after them. Carried
/// bytes are placed so that they end on an aligned offset, which keeps every
/// read window aligned when the buffer itself is.
#[derive(Debug)]
pub struct ReadCursor<B> {
    buffer: B,
    start: usize,
    end: usize,
    limit: usize,
    alignment: usize,
}

impl<B: DerefMut<Target = [u8]>> ReadCursor<B> {
    /// Creates a cursor that uses at most `limit` bytes of `buffer` and
    /// issues reads whose length is a multiple of `alignment`.
    ///
    /// The limit is rounded down to the alignment.
    pub fn new(buffer: B, limit: usize, alignment: usize) -> Self {
        let limit = align_down(limit.min(buffer.len()), alignment);
        Self {
            buffer,
            start: 0,
            end: 0,
            limit,
            alignment,
        }
    }

    /// Length of the valid window.
    #[must_use]
    pub fn valid_len(&self) -> usize {
        self.end - self.start
    }

    /// Usable size of the buffer.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The valid window.
    #[must_use]
    pub fn filled(&self) -> &[u8] {
        &self.buffer[self.start..self.end]
    }

    /// Issues one aligned read after the valid window.
    ///
    /// Returns `Ok(None)` without reading when the aligned free space is
    /// empty, otherwise the number of bytes read (0 at end of stream).
    pub fn fill<R: Read>(&mut self, reader: &mut R) -> io::Result<Option<usize>> {
        let room = align_down(self.limit.saturating_sub(self.end), self.alignment);
        if room == 0 {
            return Ok(None);
        }
        let window = &mut self.buffer[self.end..self.end + room];
        loop {
            match reader.read(window) {
                Ok(n) => {
                    self.end += n;
                    return Ok(Some(n));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Keeps only `range` of the valid window, moved so that it ends on the
    /// first aligned offset that can hold it.
    pub fn carry(&mut self, range: Range<usize>) {
        debug_assert!(range.end <= self.valid_len());
        let len = range.len();
        let end = align_up(len, self.alignment);
        let from = self.start + range.start;
        self.buffer.copy_within(from..from + len, end - len);
        self.start = end - len;
        self.end = end;
    }

    /// Discards the valid window.
    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Copies `range` of the valid window out of the buffer.
    #[must_use]
    pub fn copy_out(&self, range: Range<usize>) -> Bytes {
        Bytes::copy_from_slice(&self.filled()[range])
    }
}

/// Reads from `reader` until the run starting at `start_offset` is
/// assembled or the stream is exhausted.
///
/// A run that reaches the end of the buffer without hitting the record
/// bound is carried to the front and topped up by further reads, so the
/// result does not depend on how the stream splits its bytes. The run is
/// returned once it is bounded, the stream ends, or the buffer is full.
///
/// # Errors
///
/// Returns [`StorageError::Io`] if a read fails, [`StorageError::Chunk`]
/// if a fully buffered header is invalid, and [`StorageError::Canceled`]
/// if `cancel` fires before a read.
pub fn read_chunks_from<R, B>(
    reader: &mut R,
    cursor: &mut ReadCursor<B>,
    start_offset: i64,
    max_records: usize,
    cancel: Option<&CancellationToken>,
) -> StorageResult<ReadOutcome>
where
    R: Read,
    B: DerefMut<Target = [u8]>,
{
    // Length of a complete but still growing run at the front of the buffer.
    let mut pending: Option<usize> = None;

    loop {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(StorageError::Canceled);
        }

        let Some(read) = cursor.fill(reader)? else {
            if let Some(len) = pending {
                return Ok(ReadOutcome::Chunks(cursor.copy_out(0..len)));
            }
            warn!(
                start_offset,
                buffered = cursor.valid_len(),
                limit = cursor.limit(),
                "chunk does not fit the read buffer"
            );
            return Ok(ReadOutcome::Empty);
        };

        if read == 0 {
            debug!(start_offset, buffered = cursor.valid_len(), "end of segment");
            return Ok(match pending {
                Some(len) => ReadOutcome::Chunks(cursor.copy_out(0..len)),
                None => ReadOutcome::Empty,
            });
        }

        match scan(cursor.filled(), start_offset, max_records)? {
            Scan::Complete {
                range,
                bounded: true,
            } => return Ok(ReadOutcome::Chunks(cursor.copy_out(range))),
            Scan::Complete {
                range,
                bounded: false,
            } => {
                // Bytes after the run are the start of the next chunk; the
                // stream has already moved past them.
                pending = Some(range.len());
                cursor.carry(range.start..cursor.valid_len());
            }
            Scan::Incomplete { remainder } => cursor.carry(remainder),
            Scan::NotFound => cursor.reset(),
        }
    }
}
