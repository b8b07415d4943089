//! Frame header layout.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut};
use std::fmt;

/// Encoded size of a frame header.
///
/// version (1) + stream_id (2) + opcode (1) + body_length (4) = 8 bytes
pub const HEADER_SIZE: usize = 1 + 2 + 1 + 4;

/// The only protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Kind of frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Opens a connection.
    Startup = 0,
    /// Acknowledges a startup.
    Ready = 1,
    /// Error response carrying a message.
    Error = 2,
    /// Replication request.
    Data = 3,
    /// Replication response.
    DataResponse = 4,
}

impl Opcode {
    /// Returns the wire byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Startup),
            1 => Ok(Self::Ready),
            2 => Ok(Self::Error),
            3 => Ok(Self::Data),
            4 => Ok(Self::DataResponse),
            other => Err(ProtocolError::UnknownOpcode(other)),
        }
    }
}

/// Correlates a response with the request that caused it.
///
/// Stream ids are chosen by the requester and echoed back verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId(pub u16);

impl StreamId {
    /// Creates a stream id.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Header that prefixes every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version.
    pub version: u8,
    /// Stream the frame belongs to.
    pub stream_id: StreamId,
    /// Frame kind.
    pub opcode: Opcode,
    /// Length of the body that follows.
    pub body_length: u32,
}

impl Header {
    /// Creates a header at the current protocol version.
    #[must_use]
    pub const fn new(stream_id: StreamId, opcode: Opcode, body_length: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            stream_id,
            opcode,
            body_length,
        }
    }

    /// Creates a header for a body of `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BodyTooLarge`] if `len` does not fit in 32 bits.
    pub fn for_body(stream_id: StreamId, opcode: Opcode, len: usize) -> ProtocolResult<Self> {
        let body_length = u32::try_from(len).map_err(|_| ProtocolError::BodyTooLarge { len })?;
        Ok(Self::new(stream_id, opcode, body_length))
    }

    /// Writes the header.
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.version);
        buf.put_u16(self.stream_id.0);
        buf.put_u8(self.opcode.as_u8());
        buf.put_u32(self.body_length);
    }

    /// Decodes a header from the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// # Errors
    ///
    /// Fails if fewer than [`HEADER_SIZE`] bytes are present, the version is
    /// not [`PROTOCOL_VERSION`] or the opcode is unknown.
    pub fn decode(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::truncated(HEADER_SIZE, data.len()));
        }
        let mut buf = &data[..HEADER_SIZE];
        let version = buf.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let stream_id = StreamId(buf.get_u16());
        let opcode = Opcode::try_from(buf.get_u8())?;
        let body_length = buf.get_u32();
        Ok(Self {
            version,
            stream_id,
            opcode,
            body_length,
        })
    }

    /// Length of header plus body.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        HEADER_SIZE + self.body_length as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let header = Header::new(StreamId(0x0102), Opcode::DataResponse, 0x0A0B_0C0D);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf, vec![1, 0x01, 0x02, 4, 0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(Header::decode(&buf).unwrap(), header);
    }

    #[test]
    fn opcodes_roundtrip() {
        for op in [
            Opcode::Startup,
            Opcode::Ready,
            Opcode::Error,
            Opcode::Data,
            Opcode::DataResponse,
        ] {
            assert_eq!(Opcode::try_from(op.as_u8()).unwrap(), op);
        }
        assert!(matches!(
            Opcode::try_from(5),
            Err(ProtocolError::UnknownOpcode(5))
        ));
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(
            Header::decode(&[1, 0, 0]),
            Err(ProtocolError::Truncated { needed: 8, available: 3 })
        ));
        assert!(matches!(
            Header::decode(&[2, 0, 0, 0, 0, 0, 0, 0]),
            Err(ProtocolError::UnsupportedVersion(2))
        ));
        assert!(matches!(
            Header::decode(&[1, 0, 0, 9, 0, 0, 0, 0]),
            Err(ProtocolError::UnknownOpcode(9))
        ));
    }
}
