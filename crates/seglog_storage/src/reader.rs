//! Locating a chunk run inside a filled read buffer.

use seglog_chunk::{decode_header, skip_padding, ChunkHeader, ChunkResult};
use std::ops::Range;

/// Result of scanning a buffer for the chunk holding a target offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// The target chunk was found.
    ///
    /// `range` starts at the target chunk's header (its leading padding is
    /// excluded) and ends after the last included chunk's body. Padding
    /// between included chunks is kept.
    Complete {
        /// Byte range of the run in the scanned buffer.
        range: Range<usize>,
        /// True if the run cannot grow any further: the record bound was
        /// reached or the next bytes are not a valid chunk. False if the
        /// run stopped only because the buffer ended.
        bounded: bool,
    },

    /// A header or body was cut short by the end of the buffer before the
    /// target was found.
    Incomplete {
        /// Bytes to carry into the next read, including leading padding.
        remainder: Range<usize>,
    },

    /// Every chunk in the buffer was walked without finding the target.
    NotFound,
}

/// Outcome of decoding the chunk at one buffer position.
enum Step {
    /// A whole chunk; `end` is the position just past its body.
    Chunk {
        header: ChunkHeader,
        header_at: usize,
        end: usize,
    },
    /// Padding only, or a header or body that does not fit yet.
    Partial,
    /// Nothing left after padding.
    End,
}

fn next_chunk(buf: &[u8], pos: usize) -> ChunkResult<Step> {
    let header_at = pos + skip_padding(&buf[pos..]);
    if header_at == buf.len() {
        return Ok(if header_at == pos { Step::End } else { Step::Partial });
    }

    let header = match decode_header(&buf[header_at..]) {
        Ok(header) => header,
        Err(err) if err.is_incomplete() => return Ok(Step::Partial),
        Err(err) => return Err(err),
    };

    let end = header_at + header.chunk_len();
    if end > buf.len() {
        return Ok(Step::Partial);
    }
    Ok(Step::Chunk {
        header,
        header_at,
        end,
    })
}

/// Scans `buf` for the chunk whose record range holds `start_offset` and
/// extends the run while following chunks start at or before
/// `start_offset + max_records - 1`.
///
/// A `max_records` of 0 is treated as 1. The chunk is the unit of return,
/// so the run may hold more records than asked for.
///
/// # Errors
///
/// Returns [`seglog_chunk::ChunkError::InvalidHeader`] if a fully buffered header met
/// before the target violates the layout.
pub fn scan(buf: &[u8], start_offset: i64, max_records: usize) -> ChunkResult<Scan> {
    let extra = i64::try_from(max_records.max(1) - 1).unwrap_or(i64::MAX);
    let max_offset = start_offset.saturating_add(extra);

    let mut pos = 0;
    loop {
        match next_chunk(buf, pos)? {
            Step::End => return Ok(Scan::NotFound),
            Step::Partial => {
                return Ok(Scan::Incomplete {
                    remainder: pos..buf.len(),
                })
            }
            Step::Chunk {
                header,
                header_at,
                end,
            } => {
                if header.contains(start_offset) {
                    return Ok(extend_run(buf, header, header_at, end, max_offset));
                }
                pos = end;
            }
        }
    }
}

fn extend_run(buf: &[u8], first: ChunkHeader, from: usize, mut end: usize, max_offset: i64) -> Scan {
    let mut last = first;
    let bounded = loop {
        // Offsets have no gaps, so the next chunk starts at `last.end()`.
        if last.end() > max_offset {
            break true;
        }
        match next_chunk(buf, end) {
            Ok(Step::Chunk {
                header,
                end: next_end,
                ..
            }) => {
                if header.start > max_offset {
                    break true;
                }
                last = header;
                end = next_end;
            }
            Ok(Step::Partial | Step::End) => break false,
            // Garbage after the run ends it; the chunks before it are whole.
            Err(_) => break true,
        }
    };

    Scan::Complete {
        range: from..end,
        bounded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seglog_chunk::{put_padding, Chunk, ChunkError, ALIGNMENT_FLAG, HEADER_SIZE};

    /// Encodes `(start, records, body_len)` chunks, each preceded by `padding` bytes.
    fn segment(chunks: &[(i64, u32, usize)], padding: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        for &(start, records, body_len) in chunks {
            put_padding(&mut buf, padding);
            Chunk::new(start, records, vec![0x11u8; body_len])
                .unwrap()
                .encode(&mut buf);
        }
        buf
    }

    fn complete(scan: Scan) -> (Range<usize>, bool) {
        match scan {
            Scan::Complete { range, bounded } => (range, bounded),
            other => panic!("expected complete scan, got {other:?}"),
        }
    }

    #[test]
    fn finds_first_chunk() {
        let buf = segment(&[(0, 2, 10), (2, 3, 5)], 0);
        let (range, bounded) = complete(scan(&buf, 0, 1).unwrap());
        assert_eq!(range, 0..HEADER_SIZE + 10);
        assert!(bounded);
    }

    #[test]
    fn finds_offset_inside_later_chunk() {
        let buf = segment(&[(0, 2, 10), (2, 3, 5), (5, 1, 0)], 0);
        let second = HEADER_SIZE + 10;
        let (range, _) = complete(scan(&buf, 4, 1).unwrap());
        assert_eq!(range, second..second + HEADER_SIZE + 5);
    }

    #[test]
    fn accumulates_up_to_record_bound() {
        let buf = segment(&[(0, 1, 4), (1, 1, 4), (2, 1, 4), (3, 1, 4)], 3);
        let chunk = 3 + HEADER_SIZE + 4;

        let (range, bounded) = complete(scan(&buf, 0, 3).unwrap());
        assert_eq!(range, 3..3 * chunk);
        assert!(bounded);
    }

    #[test]
    fn run_to_buffer_end_is_unbounded() {
        let buf = segment(&[(0, 1, 4), (1, 1, 4)], 0);
        let (range, bounded) = complete(scan(&buf, 0, 100).unwrap());
        assert_eq!(range, 0..buf.len());
        assert!(!bounded);
    }

    #[test]
    fn partial_next_chunk_ends_run_unbounded() {
        let buf = segment(&[(0, 1, 4), (1, 1, 40)], 0);
        let cut = &buf[..buf.len() - 1];
        let (range, bounded) = complete(scan(cut, 0, 10).unwrap());
        assert_eq!(range, 0..HEADER_SIZE + 4);
        assert!(!bounded);
    }

    #[test]
    fn max_records_zero_acts_as_one() {
        let buf = segment(&[(0, 1, 4), (1, 1, 4)], 0);
        assert_eq!(scan(&buf, 0, 0).unwrap(), scan(&buf, 0, 1).unwrap());
    }

    #[test]
    fn wide_chunk_is_returned_whole() {
        let buf = segment(&[(0, 50, 8), (50, 1, 8)], 0);
        let (range, bounded) = complete(scan(&buf, 10, 1).unwrap());
        assert_eq!(range, 0..HEADER_SIZE + 8);
        assert!(bounded);
    }

    #[test]
    fn truncated_body_before_target_is_incomplete() {
        let buf = segment(&[(0, 1, 4), (1, 1, 30)], 6);
        let first_end = 6 + HEADER_SIZE + 4;
        let cut = &buf[..buf.len() - 10];
        assert_eq!(
            scan(cut, 1, 1).unwrap(),
            Scan::Incomplete {
                remainder: first_end..cut.len()
            }
        );
    }

    #[test]
    fn truncated_header_is_incomplete() {
        let buf = segment(&[(0, 1, 4)], 0);
        let cut = &buf[..HEADER_SIZE - 3];
        assert_eq!(
            scan(cut, 0, 1).unwrap(),
            Scan::Incomplete {
                remainder: 0..cut.len()
            }
        );
    }

    #[test]
    fn padding_only_is_incomplete_with_padding_kept() {
        let buf = vec![ALIGNMENT_FLAG; 64];
        assert_eq!(
            scan(&buf, 0, 1).unwrap(),
            Scan::Incomplete { remainder: 0..64 }
        );
    }

    #[test]
    fn empty_buffer_is_not_found() {
        assert_eq!(scan(&[], 0, 1).unwrap(), Scan::NotFound);
    }

    #[test]
    fn offset_past_last_chunk_is_not_found() {
        let buf = segment(&[(0, 2, 4), (2, 2, 4)], 5);
        assert_eq!(scan(&buf, 4, 1).unwrap(), Scan::NotFound);
    }

    #[test]
    fn offset_before_first_chunk_is_not_found() {
        let buf = segment(&[(10, 2, 4)], 0);
        assert_eq!(scan(&buf, 3, 1).unwrap(), Scan::NotFound);
    }

    #[test]
    fn invalid_header_before_target_is_error() {
        let mut buf = segment(&[(0, 1, 4)], 0);
        // Zero the record count.
        buf[HEADER_SIZE - 4..HEADER_SIZE].fill(0);
        assert!(matches!(
            scan(&buf, 0, 1),
            Err(ChunkError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn garbage_after_run_bounds_it() {
        let mut buf = segment(&[(0, 1, 4)], 0);
        buf.extend_from_slice(&[0x00; HEADER_SIZE]);
        let (range, bounded) = complete(scan(&buf, 0, 10).unwrap());
        assert_eq!(range, 0..HEADER_SIZE + 4);
        assert!(bounded);
    }
}
