//! # seglog interbroker
//!
//! Wire framing and request lifecycle for replicating chunk runs between
//! brokers.
//!
//! ## Frame Format
//!
//! ```text
//! | version (1) | stream_id (2) | opcode (1) | body_length (4) | body |
//! ```
//!
//! All integers are big-endian. The layout is the interoperability
//! contract between brokers and must match bit for bit.
//!
//! ## Sending
//!
//! ```rust,ignore
//! let inflight = InFlightRequests::new(frames_tx);
//! let (request, mut handle) = DataRequest::new(DataRequestBody::new(&topic, segment_id, chunks));
//! inflight.send(request)?;
//! // the connection task feeds decoded items to inflight.handle_inbound(...)
//! handle.acknowledged().await?;
//! ```
//!
//! ## Receiving
//!
//! ```rust,ignore
//! let (handler, mut appends) = ReplicaHandler::new(&config, shutdown.clone());
//! // appender task: appends.recv().await, then request.set_append_result(...)
//! if let Some(reply) = handler.respond(inbound).await? {
//!     write_to_peer(reply).await?;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod frame;
mod header;
mod inflight;
mod message;
mod replica;
mod request;

pub use config::{InterbrokerConfig, DEFAULT_APPEND_QUEUE_DEPTH};
pub use error::{ProtocolError, ProtocolResult, RequestError, RequestResult};
pub use frame::{Frame, FrameCodec, Inbound, DEFAULT_MAX_BODY_LENGTH};
pub use header::{Header, Opcode, StreamId, HEADER_SIZE, PROTOCOL_VERSION};
pub use inflight::{FrameSink, InFlightRequests, HANDSHAKE_STREAM};
pub use message::{
    marshal_data_request, marshal_data_request_body, marshal_ready, marshal_response,
    marshal_startup, unmarshal_data_request, unmarshal_response, DataRequestBody, Response,
    ResponseFrame, MAX_TOPIC_LEN, META_SIZE,
};
pub use replica::ReplicaHandler;
pub use request::{
    AppendResult, DataRequest, ReceiverState, RequestHandle, RequestState, SenderState,
};
