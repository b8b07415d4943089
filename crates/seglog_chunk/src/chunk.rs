//! Owned chunks, alignment padding and chunk-run iteration.

use crate::error::{ChunkError, ChunkResult};
use crate::header::{decode_header, ChunkHeader, ALIGNMENT_FLAG, HEADER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};

/// A framed chunk: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    header: ChunkHeader,
    body: Bytes,
}

impl Chunk {
    /// Creates a chunk covering `record_length` records starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if `record_length` is zero or the body does not fit
    /// the 32-bit length field.
    pub fn new(start: i64, record_length: u32, body: impl Into<Bytes>) -> ChunkResult<Self> {
        let body = body.into();
        let body_length =
            u32::try_from(body.len()).map_err(|_| ChunkError::BodyTooLarge { len: body.len() })?;
        if record_length == 0 {
            return Err(ChunkError::invalid_header("a chunk must hold at least one record"));
        }

        Ok(Self {
            header: ChunkHeader::new(start, record_length, body_length),
            body,
        })
    }

    /// Returns the chunk header.
    #[must_use]
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    /// Returns the chunk body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Encoded length of header plus body.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.header.chunk_len()
    }

    /// Writes header and body.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.encode(buf);
        buf.put_slice(&self.body);
    }

    /// Returns the encoded chunk.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Counts the run of alignment padding bytes at the start of `data`.
#[must_use]
pub fn skip_padding(data: &[u8]) -> usize {
    data.iter().take_while(|&&b| b == ALIGNMENT_FLAG).count()
}

/// Number of padding bytes needed to move `position` up to the next
/// multiple of `alignment`.
///
/// Returns 0 when `position` is already aligned or `alignment` is 0.
#[must_use]
pub fn padding_for(position: u64, alignment: usize) -> usize {
    if alignment == 0 {
        return 0;
    }
    let rem = (position % alignment as u64) as usize;
    if rem == 0 {
        0
    } else {
        alignment - rem
    }
}

/// Writes `len` alignment padding bytes.
pub fn put_padding<B: BufMut>(buf: &mut B, len: usize) {
    buf.put_bytes(ALIGNMENT_FLAG, len);
}

/// A chunk borrowed from a byte slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRef<'a> {
    /// Decoded header.
    pub header: ChunkHeader,
    /// Body bytes.
    pub body: &'a [u8],
}

/// Iterates the chunks of a contiguous run, skipping alignment padding.
///
/// Trailing padding ends the run cleanly. A header or body cut short by
/// the end of the slice yields one error and then ends the iteration.
#[derive(Debug, Clone)]
pub struct ChunkRun<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> ChunkRun<'a> {
    /// Creates an iterator over `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for ChunkRun<'a> {
    type Item = ChunkResult<ChunkRef<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rest = &self.data[self.pos..];
        let padding = skip_padding(rest);
        let rest = &rest[padding..];
        if rest.is_empty() {
            self.done = true;
            return None;
        }

        let header = match decode_header(rest) {
            Ok(header) => header,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        let needed = header.chunk_len();
        if rest.len() < needed {
            self.done = true;
            return Some(Err(ChunkError::Truncated {
                needed,
                available: rest.len(),
            }));
        }

        self.pos += padding + needed;
        Some(Ok(ChunkRef {
            header,
            body: &rest[HEADER_SIZE..needed],
        }))
    }
}
