//! Frame codec for byte-stream transports.
//!
//! Frame format:
//! ```text
//! +-------------+---------------+------------+-----------------+------------------+
//! | version (1) | stream_id (2) | opcode (1) | body_length (4) | body             |
//! +-------------+---------------+------------+-----------------+------------------+
//! ```

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{Header, Opcode, StreamId, HEADER_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default limit on a frame body (64 MiB).
pub const DEFAULT_MAX_BODY_LENGTH: usize = 64 * 1024 * 1024;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header.
    pub header: Header,
    /// Frame body, exactly `header.body_length` bytes.
    pub body: Bytes,
}

impl Frame {
    /// Creates a frame around `body`.
    ///
    /// # Errors
    ///
    /// Fails if the body does not fit the 32-bit length field.
    pub fn new(stream_id: StreamId, opcode: Opcode, body: impl Into<Bytes>) -> ProtocolResult<Self> {
        let body = body.into();
        let header = Header::for_body(stream_id, opcode, body.len())?;
        Ok(Self { header, body })
    }

    /// Splits one complete encoded frame into header and body.
    ///
    /// # Errors
    ///
    /// Fails if the header is invalid or `bytes` is shorter than the frame
    /// it describes.
    pub fn parse(mut bytes: Bytes) -> ProtocolResult<Self> {
        let header = Header::decode(&bytes)?;
        if bytes.len() < header.frame_len() {
            return Err(ProtocolError::truncated(header.frame_len(), bytes.len()));
        }
        bytes.advance(HEADER_SIZE);
        let body = bytes.split_to(header.body_length as usize);
        Ok(Self { header, body })
    }

    /// Stream the frame belongs to.
    pub fn stream_id(&self) -> StreamId {
        self.header.stream_id
    }

    /// Frame kind.
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }
}

/// One item read off a connection.
///
/// The body length fixes where a frame ends even when the rest of its
/// header is bad, so a malformed frame is skipped whole and the stream
/// stays in sync.
#[derive(Debug)]
pub enum Inbound {
    /// A well-formed frame.
    Frame(Frame),
    /// A frame whose version or opcode could not be decoded. Its body was
    /// discarded.
    Malformed {
        /// Stream the peer sent the frame on.
        stream_id: StreamId,
        /// Why the header was rejected.
        error: ProtocolError,
    },
}

impl Inbound {
    /// Stream the item arrived on.
    pub fn stream_id(&self) -> StreamId {
        match self {
            Self::Frame(frame) => frame.stream_id(),
            Self::Malformed { stream_id, .. } => *stream_id,
        }
    }

    /// Returns the frame, or the header error for a malformed item.
    ///
    /// # Errors
    ///
    /// Returns the error that made the header malformed.
    pub fn into_frame(self) -> ProtocolResult<Frame> {
        match self {
            Self::Frame(frame) => Ok(frame),
            Self::Malformed { error, .. } => Err(error),
        }
    }
}

impl From<Frame> for Inbound {
    fn from(frame: Frame) -> Self {
        Self::Frame(frame)
    }
}

/// Reads the stream id and body length, which are valid in any header.
fn frame_bounds(mut header: &[u8]) -> (StreamId, usize) {
    header.advance(1);
    let stream_id = StreamId(header.get_u16());
    header.advance(1);
    (stream_id, header.get_u32() as usize)
}

/// Splits a byte stream into [`Inbound`] items and writes frames back out.
///
/// Partial frames stay in the source buffer until the rest arrives. Only an
/// oversized body is fatal to the stream.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_body_length: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Creates a codec with the default body limit.
    pub fn new() -> Self {
        Self {
            max_body_length: DEFAULT_MAX_BODY_LENGTH,
        }
    }

    /// Creates a codec that rejects bodies above `max_body_length`.
    pub fn with_max_body_length(max_body_length: usize) -> Self {
        Self { max_body_length }
    }

    /// Returns the body limit.
    pub fn max_body_length(&self) -> usize {
        self.max_body_length
    }

    fn check_len(&self, len: usize) -> ProtocolResult<()> {
        if len > self.max_body_length {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_body_length,
            });
        }
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Inbound;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> ProtocolResult<Option<Inbound>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Check the length before buffering the body.
        let (stream_id, body_length) = frame_bounds(&src[..HEADER_SIZE]);
        self.check_len(body_length)?;

        let total = HEADER_SIZE + body_length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let header = Header::decode(&src[..HEADER_SIZE]);
        src.advance(HEADER_SIZE);
        let body = src.split_to(body_length).freeze();
        Ok(Some(match header {
            Ok(header) => Inbound::Frame(Frame { header, body }),
            Err(error) => Inbound::Malformed { stream_id, error },
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> ProtocolResult<()> {
        self.check_len(frame.body.len())?;
        let header = Header::for_body(frame.header.stream_id, frame.header.opcode, frame.body.len())?;
        dst.reserve(header.frame_len());
        header.encode(dst);
        dst.put_slice(&frame.body);
        Ok(())
    }
}
