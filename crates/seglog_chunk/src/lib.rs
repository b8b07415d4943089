//! # seglog chunk
//!
//! The chunk framing shared by segment files and the interbroker wire.
//!
//! A segment file is a sequence of chunks. Each chunk is a fixed-size
//! header followed by an opaque body, optionally preceded by a run of
//! alignment padding bytes written to keep direct I/O reads aligned.
//!
//! ## Chunk Format
//!
//! ```text
//! | padding (0..N x 0x80) | flags (1) | body_length (4) | start (8) | record_length (4) | body (body_length) |
//! ```
//!
//! All integers are big-endian. The header carries no checksum in this
//! format version.
//!
//! ## Usage
//!
//! ```
//! use seglog_chunk::{decode_header, Chunk, ChunkRun};
//!
//! let chunk = Chunk::new(10, 2, vec![1u8, 2, 3]).unwrap();
//! let bytes = chunk.to_bytes();
//!
//! let header = decode_header(&bytes).unwrap();
//! assert!(header.contains(11));
//!
//! let run: Vec<_> = ChunkRun::new(&bytes).collect::<Result<_, _>>().unwrap();
//! assert_eq!(run[0].body, &[1, 2, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod chunk;
mod error;
mod header;

pub use chunk::{padding_for, put_padding, skip_padding, Chunk, ChunkRef, ChunkRun};
pub use error::{ChunkError, ChunkResult};
pub use header::{decode_header, ChunkHeader, ALIGNMENT_FLAG, DEFAULT_ALIGNMENT_SIZE, HEADER_SIZE};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn header_roundtrip(start in any::<i64>(), records in 1u32.., body_len in any::<u32>()) {
            let header = ChunkHeader::new(start, records, body_len);
            prop_assert_eq!(decode_header(&header.to_bytes()).unwrap(), header);
        }

        #[test]
        fn any_padding_is_skipped(padding in 0usize..2048, body in prop::collection::vec(any::<u8>(), 0..64)) {
            let chunk = Chunk::new(42, 1, body.clone()).unwrap();
            let mut data = Vec::new();
            put_padding(&mut data, padding);
            chunk.encode(&mut data);

            prop_assert_eq!(skip_padding(&data), padding);
            let decoded: Vec<_> = ChunkRun::new(&data).collect::<Result<_, _>>().unwrap();
            prop_assert_eq!(decoded.len(), 1);
            prop_assert_eq!(decoded[0].body, &body[..]);
        }
    }
}
