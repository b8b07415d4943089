//! Message bodies carried in frames.
//!
//! ## Data Request Body
//!
//! ```text
//! | segment_id (8) | token (8) | gen_id (4) | topic_length (1) | topic | payload |
//! ```
//!
//! The payload is opaque here. It is normally a run of chunks and is
//! validated by the chunk codec on the receiving side, not by this module.

use crate::error::{ProtocolError, ProtocolResult};
use crate::header::{Header, Opcode, StreamId, HEADER_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use seglog_types::{GenId, SegmentId, Token, TopicDataId};

/// Size of the fixed metadata block that starts a data request body.
///
/// segment_id (8) + token (8) + gen_id (4) + topic_length (1) = 21 bytes
pub const META_SIZE: usize = 8 + 8 + 4 + 1;

/// Longest topic name the length byte can express.
pub const MAX_TOPIC_LEN: usize = u8::MAX as usize;

/// A replication request: a run of chunks for one segment of one topic
/// shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequestBody {
    /// Segment the payload belongs to.
    pub segment_id: SegmentId,
    /// Owning token of the shard.
    pub token: Token,
    /// Generation the sender is replicating under.
    pub gen_id: GenId,
    /// Topic name.
    pub topic: String,
    /// Raw chunk bytes.
    pub data: Bytes,
}

impl DataRequestBody {
    /// Creates a request body for `topic`.
    pub fn new(topic: &TopicDataId, segment_id: SegmentId, data: impl Into<Bytes>) -> Self {
        Self {
            segment_id,
            token: topic.token(),
            gen_id: topic.gen_id(),
            topic: topic.name().to_string(),
            data: data.into(),
        }
    }

    /// Returns the shard this request targets.
    pub fn topic_id(&self) -> TopicDataId {
        TopicDataId::new(self.topic.clone(), self.token, self.gen_id)
    }

    /// Encoded body length.
    pub fn encoded_len(&self) -> usize {
        META_SIZE + self.topic.len() + self.data.len()
    }

    fn encode<B: BufMut>(&self, buf: &mut B) -> ProtocolResult<()> {
        let topic_len = u8::try_from(self.topic.len()).map_err(|_| ProtocolError::TopicTooLong {
            len: self.topic.len(),
        })?;
        buf.put_i64(self.segment_id.as_i64());
        buf.put_i64(self.token.as_i64());
        buf.put_u32(self.gen_id.as_u32());
        buf.put_u8(topic_len);
        buf.put_slice(self.topic.as_bytes());
        buf.put_slice(&self.data);
        Ok(())
    }
}

/// Encodes a full data frame: header followed by the request body.
///
/// # Errors
///
/// Fails if the topic is longer than [`MAX_TOPIC_LEN`] bytes or the body
/// does not fit the 32-bit length field.
pub fn marshal_data_request(stream_id: StreamId, body: &DataRequestBody) -> ProtocolResult<Bytes> {
    let header = Header::for_body(stream_id, Opcode::Data, body.encoded_len())?;
    let mut buf = BytesMut::with_capacity(header.frame_len());
    header.encode(&mut buf);
    body.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Encodes just the request body, without a frame header.
///
/// # Errors
///
/// Fails if the topic is longer than [`MAX_TOPIC_LEN`] bytes.
pub fn marshal_data_request_body(body: &DataRequestBody) -> ProtocolResult<Bytes> {
    let mut buf = BytesMut::with_capacity(body.encoded_len());
    body.encode(&mut buf)?;
    Ok(buf.freeze())
}

/// Decodes a request body.
///
/// The returned payload is a slice of `body`; nothing is copied.
///
/// # Errors
///
/// Fails if the metadata block or topic is truncated, or the topic is not
/// UTF-8.
pub fn unmarshal_data_request(mut body: Bytes) -> ProtocolResult<DataRequestBody> {
    if body.len() < META_SIZE {
        return Err(ProtocolError::truncated(META_SIZE, body.len()));
    }
    let segment_id = SegmentId::new(body.get_i64());
    let token = Token::new(body.get_i64());
    let gen_id = GenId::new(body.get_u32());
    let topic_len = usize::from(body.get_u8());

    if body.len() < topic_len {
        return Err(ProtocolError::truncated(META_SIZE + topic_len, META_SIZE + body.len()));
    }
    let topic_bytes = body.split_to(topic_len);
    let topic = std::str::from_utf8(&topic_bytes)
        .map_err(|_| ProtocolError::InvalidTopic)?
        .to_string();

    Ok(DataRequestBody {
        segment_id,
        token,
        gen_id,
        topic,
        data: body,
    })
}

/// A response to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The request failed on the peer.
    Error {
        /// Human-readable reason.
        message: String,
    },
    /// Empty acknowledgement; the opcode carries the meaning.
    Ack {
        /// Opcode of the acknowledgement frame.
        op: Opcode,
    },
    /// Response carrying a body.
    Data {
        /// Response body.
        payload: Bytes,
    },
}

impl Response {
    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Acknowledgement of a data request.
    pub const fn data_ack() -> Self {
        Self::Ack {
            op: Opcode::DataResponse,
        }
    }

    /// Returns true for error responses.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// A response together with the stream it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Stream of the originating request.
    pub stream_id: StreamId,
    /// The response.
    pub response: Response,
}

/// Encodes a response frame.
///
/// # Errors
///
/// Fails if the body does not fit the 32-bit length field.
pub fn marshal_response(stream_id: StreamId, response: &Response) -> ProtocolResult<Bytes> {
    let (opcode, body): (Opcode, &[u8]) = match response {
        Response::Error { message } => (Opcode::Error, message.as_bytes()),
        Response::Ack { op } => (*op, &[][..]),
        Response::Data { payload } => (Opcode::DataResponse, &payload[..]),
    };
    let header = Header::for_body(stream_id, opcode, body.len())?;
    let mut buf = BytesMut::with_capacity(header.frame_len());
    header.encode(&mut buf);
    buf.put_slice(body);
    Ok(buf.freeze())
}

/// Decodes the response carried by a frame.
///
/// Error bodies decode lossily so that a peer's malformed message still
/// reaches the caller. An empty body on any other opcode is an ack.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedOpcode`] for request opcodes.
pub fn unmarshal_response(header: &Header, body: Bytes) -> ProtocolResult<ResponseFrame> {
    let response = match header.opcode {
        Opcode::Error => Response::Error {
            message: String::from_utf8_lossy(&body).into_owned(),
        },
        Opcode::Ready | Opcode::DataResponse if body.is_empty() => Response::Ack { op: header.opcode },
        Opcode::Ready | Opcode::DataResponse => Response::Data { payload: body },
        op @ (Opcode::Startup | Opcode::Data) => return Err(ProtocolError::UnexpectedOpcode(op)),
    };
    Ok(ResponseFrame {
        stream_id: header.stream_id,
        response,
    })
}

/// Encodes a startup frame.
pub fn marshal_startup(stream_id: StreamId) -> Bytes {
    empty_frame(stream_id, Opcode::Startup)
}

/// Encodes a ready frame.
pub fn marshal_ready(stream_id: StreamId) -> Bytes {
    empty_frame(stream_id, Opcode::Ready)
}

fn empty_frame(stream_id: StreamId, opcode: Opcode) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE);
    Header::new(stream_id, opcode, 0).encode(&mut buf);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(topic: &str, data: &'static [u8]) -> DataRequestBody {
        DataRequestBody {
            segment_id: SegmentId::new(1024),
            token: Token::new(-1),
            gen_id: GenId::new(2),
            topic: topic.to_string(),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn data_request_layout() {
        let frame = marshal_data_request(StreamId(7), &body("ev", b"xyz")).unwrap();
        let header = Header::decode(&frame).unwrap();
        assert_eq!(header.opcode, Opcode::Data);
        assert_eq!(header.body_length as usize, META_SIZE + 2 + 3);
        assert_eq!(&frame[HEADER_SIZE..HEADER_SIZE + 8], &1024i64.to_be_bytes());
        assert_eq!(&frame[HEADER_SIZE + 16..HEADER_SIZE + 20], &2u32.to_be_bytes());
        assert_eq!(frame[HEADER_SIZE + 20], 2);
        assert_eq!(&frame[frame.len() - 3..], b"xyz");
    }

    #[test]
    fn unmarshal_slices_payload() {
        let encoded = marshal_data_request_body(&body("topic", b"payload")).unwrap();
        let decoded = unmarshal_data_request(encoded.clone()).unwrap();
        assert_eq!(decoded, body("topic", b"payload"));
        assert_eq!(decoded.data.as_ptr(), encoded[META_SIZE + 5..].as_ptr());
        assert_eq!(decoded.topic_id().to_string(), "topic/-1/2");
    }

    #[test]
    fn rejects_long_topic() {
        let long = "t".repeat(256);
        assert!(matches!(
            marshal_data_request_body(&body(&long, b"")),
            Err(ProtocolError::TopicTooLong { len: 256 })
        ));
    }

    #[test]
    fn rejects_truncated_bodies() {
        assert!(matches!(
            unmarshal_data_request(Bytes::from_static(&[0; 20])),
            Err(ProtocolError::Truncated { needed: 21, available: 20 })
        ));

        let mut short_topic = vec![0u8; META_SIZE];
        short_topic[META_SIZE - 1] = 4;
        short_topic.extend_from_slice(b"ab");
        assert!(matches!(
            unmarshal_data_request(Bytes::from(short_topic)),
            Err(ProtocolError::Truncated { needed: 25, available: 23 })
        ));
    }

    #[test]
    fn rejects_non_utf8_topic() {
        let mut bytes = vec![0u8; META_SIZE];
        bytes[META_SIZE - 1] = 2;
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        assert!(matches!(
            unmarshal_data_request(Bytes::from(bytes)),
            Err(ProtocolError::InvalidTopic)
        ));
    }

    #[test]
    fn responses_roundtrip() {
        for response in [
            Response::error("segment sealed"),
            Response::data_ack(),
            Response::Ack { op: Opcode::Ready },
            Response::Data {
                payload: Bytes::from_static(b"body"),
            },
        ] {
            let frame = marshal_response(StreamId(9), &response).unwrap();
            let header = Header::decode(&frame).unwrap();
            let decoded = unmarshal_response(&header, frame.slice(HEADER_SIZE..)).unwrap();
            assert_eq!(decoded.stream_id, StreamId(9));
            assert_eq!(decoded.response, response);
        }
    }

    #[test]
    fn error_body_decodes_lossily() {
        let header = Header::new(StreamId(1), Opcode::Error, 3);
        let decoded = unmarshal_response(&header, Bytes::from_static(&[b'o', 0xFF, b'k'])).unwrap();
        assert_eq!(decoded.response, Response::error("o\u{FFFD}k"));
    }

    #[test]
    fn request_opcodes_are_not_responses() {
        let header = Header::new(StreamId(1), Opcode::Data, 0);
        assert!(matches!(
            unmarshal_response(&header, Bytes::new()),
            Err(ProtocolError::UnexpectedOpcode(Opcode::Data))
        ));
    }

    #[test]
    fn handshake_frames() {
        assert_eq!(&marshal_startup(StreamId(0))[..], &[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&marshal_ready(StreamId(3))[..], &[1, 0, 3, 1, 0, 0, 0, 0]);
    }
}
