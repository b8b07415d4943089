//! Outstanding requests on one connection.

use crate::error::{ProtocolResult, RequestError, RequestResult};
use crate::frame::{Frame, Inbound};
use crate::header::StreamId;
use crate::message::{marshal_data_request, unmarshal_response, Response, ResponseFrame};
use crate::request::{DataRequest, SenderState};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Writes encoded frames to a connection.
///
/// Implementations must not block; a connection task typically drains a
/// channel into the socket.
pub trait FrameSink: Send + Sync {
    /// Queues one encoded frame for sending.
    fn send_frame(&self, frame: Bytes) -> RequestResult<()>;
}

impl FrameSink for mpsc::UnboundedSender<Bytes> {
    fn send_frame(&self, frame: Bytes) -> RequestResult<()> {
        self.send(frame).map_err(|_| RequestError::ConnectionClosed)
    }
}

/// Stream id reserved for the connection handshake.
pub const HANDSHAKE_STREAM: StreamId = StreamId(0);

/// Tracks the data requests a connection has sent and not yet seen
/// answered.
///
/// Stream ids are unique among in-flight requests. Responses are routed by
/// stream id in whatever order they arrive.
pub struct InFlightRequests<S> {
    sink: S,
    state: Mutex<InFlightState>,
}

struct InFlightState {
    next_id: u16,
    pending: HashMap<StreamId, DataRequest>,
    closed: bool,
}

impl InFlightState {
    fn allocate(&mut self) -> RequestResult<StreamId> {
        for _ in 0..u16::MAX {
            let id = StreamId(self.next_id);
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.pending.contains_key(&id) {
                return Ok(id);
            }
        }
        Err(RequestError::TooManyInFlight)
    }

    fn reap_cancelled(&mut self) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, request| !request.is_cancelled());
        before - self.pending.len()
    }
}

impl<S: FrameSink> InFlightRequests<S> {
    /// Creates an empty table writing to `sink`.
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            state: Mutex::new(InFlightState {
                next_id: 1,
                pending: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Assigns a stream id, registers the request and writes its frame.
    ///
    /// # Errors
    ///
    /// Fails if the connection was failed, every stream id is in use, the
    /// request cannot be encoded or the sink rejects the frame. The request
    /// is dropped on failure, which ends its waits.
    pub fn send(&self, request: DataRequest) -> RequestResult<StreamId> {
        let mut state = self.state.lock();
        if state.closed {
            request.close();
            return Err(RequestError::ConnectionClosed);
        }
        state.reap_cancelled();

        let stream_id = state.allocate()?;
        let frame = marshal_data_request(stream_id, request.body())?;
        request.transition(SenderState::AwaitingResponse)?;
        state.pending.insert(stream_id, request);

        // Registered before the write so a fast response always finds it.
        if let Err(err) = self.sink.send_frame(frame) {
            if let Some(request) = state.pending.remove(&stream_id) {
                request.close();
            }
            warn!(stream_id = %stream_id, error = %err, "failed to write data request");
            return Err(err);
        }
        debug!(stream_id = %stream_id, in_flight = state.pending.len(), "sent data request");
        Ok(stream_id)
    }

    /// Hands a response to the request waiting on its stream id.
    ///
    /// Returns false if no request is waiting on that stream or the request
    /// was already canceled.
    pub fn route(&self, frame: ResponseFrame) -> bool {
        let request = self.state.lock().pending.remove(&frame.stream_id);
        match request {
            Some(request) => request.set_response(frame.response),
            None => {
                debug!(stream_id = %frame.stream_id, "response for unknown stream");
                false
            }
        }
    }

    /// Decodes a response frame read from the connection and routes it.
    ///
    /// # Errors
    ///
    /// Fails if the frame is not a response.
    pub fn handle_frame(&self, frame: Frame) -> ProtocolResult<bool> {
        let response = unmarshal_response(&frame.header, frame.body)?;
        Ok(self.route(response))
    }

    /// Routes one item read off the connection.
    ///
    /// A frame with a bad header fails the request on its stream with the
    /// header error.
    ///
    /// # Errors
    ///
    /// Fails if a well-formed frame is not a response.
    pub fn handle_inbound(&self, inbound: Inbound) -> ProtocolResult<bool> {
        match inbound {
            Inbound::Frame(frame) => self.handle_frame(frame),
            Inbound::Malformed { stream_id, error } => {
                warn!(stream_id = %stream_id, error = %error, "malformed response from peer");
                Ok(self.route(ResponseFrame {
                    stream_id,
                    response: Response::error(error.to_string()),
                }))
            }
        }
    }

    /// Fails every pending request after a connection error. Later sends
    /// fail with [`RequestError::ConnectionClosed`].
    ///
    /// Returns the number of requests failed.
    pub fn fail_all(&self) -> usize {
        let drained: Vec<DataRequest> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.drain().map(|(_, request)| request).collect()
        };
        for request in &drained {
            request.close();
        }
        if !drained.is_empty() {
            warn!(failed = drained.len(), "connection failed with requests in flight");
        }
        drained.len()
    }

    /// Drops canceled requests. Returns how many were removed.
    pub fn reap_cancelled(&self) -> usize {
        self.state.lock().reap_cancelled()
    }

    /// Number of requests in flight.
    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Returns true if no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true once [`InFlightRequests::fail_all`] has run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{Header, HEADER_SIZE};
    use crate::message::{unmarshal_data_request, DataRequestBody};
    use crate::request::RequestHandle;
    use bytes::Bytes;
    use seglog_types::{GenId, SegmentId, Token};

    fn request(topic: &str) -> (DataRequest, RequestHandle) {
        DataRequest::new(DataRequestBody {
            segment_id: SegmentId::new(0),
            token: Token::new(0),
            gen_id: GenId::new(1),
            topic: topic.into(),
            data: Bytes::from_static(b"chunks"),
        })
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn send_frame(&self, _frame: Bytes) -> RequestResult<()> {
            Err(RequestError::ConnectionClosed)
        }
    }

    #[test]
    fn stream_ids_are_unique() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let inflight = InFlightRequests::new(tx);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let (req, _handle) = request("events");
            ids.push(inflight.send(req).unwrap());
        }
        assert_eq!(ids, vec![StreamId(1), StreamId(2), StreamId(3)]);
        assert_eq!(inflight.len(), 3);

        let frame = rx.try_recv().unwrap();
        let header = Header::decode(&frame).unwrap();
        assert_eq!(header.stream_id, StreamId(1));
        let body = unmarshal_data_request(frame.slice(HEADER_SIZE..)).unwrap();
        assert_eq!(body.topic, "events");
    }

    #[test]
    fn allocation_skips_ids_in_use() {
        let mut state = InFlightState {
            next_id: u16::MAX,
            pending: HashMap::new(),
            closed: false,
        };
        let (req, _handle) = request("a");
        state.pending.insert(StreamId(1), req);

        assert_eq!(state.allocate().unwrap(), StreamId(u16::MAX));
        assert_eq!(state.allocate().unwrap(), StreamId(2));
    }

    #[test]
    fn exhausted_ids_are_reported() {
        let mut state = InFlightState {
            next_id: 1,
            pending: HashMap::new(),
            closed: false,
        };
        for id in 1..=u16::MAX {
            let (req, _handle) = request("a");
            state.pending.insert(StreamId(id), req);
        }
        assert!(matches!(state.allocate(), Err(RequestError::TooManyInFlight)));
    }

    #[tokio::test]
    async fn routes_out_of_order() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let inflight = InFlightRequests::new(tx);

        let (first, mut first_handle) = request("a");
        let (second, mut second_handle) = request("b");
        let first_id = inflight.send(first).unwrap();
        let second_id = inflight.send(second).unwrap();

        assert!(inflight.route(ResponseFrame {
            stream_id: second_id,
            response: Response::error("behind"),
        }));
        assert!(inflight.route(ResponseFrame {
            stream_id: first_id,
            response: Response::data_ack(),
        }));
        assert!(!inflight.route(ResponseFrame {
            stream_id: first_id,
            response: Response::data_ack(),
        }));

        first_handle.acknowledged().await.unwrap();
        assert!(matches!(
            second_handle.acknowledged().await,
            Err(RequestError::Remote(msg)) if msg == "behind"
        ));
        assert!(inflight.is_empty());
    }

    #[tokio::test]
    async fn fail_all_closes_pending() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let inflight = InFlightRequests::new(tx);

        let (req, mut handle) = request("a");
        inflight.send(req).unwrap();
        assert_eq!(inflight.fail_all(), 1);
        assert!(matches!(handle.response().await, Err(RequestError::ConnectionClosed)));

        let (req, mut handle) = request("b");
        assert!(matches!(inflight.send(req), Err(RequestError::ConnectionClosed)));
        assert!(matches!(handle.response().await, Err(RequestError::ConnectionClosed)));
        assert!(inflight.is_closed());
    }

    #[tokio::test]
    async fn sink_failure_unregisters() {
        let inflight = InFlightRequests::new(FailingSink);
        let (req, mut handle) = request("a");
        assert!(inflight.send(req).is_err());
        assert!(inflight.is_empty());
        assert!(matches!(handle.response().await, Err(RequestError::ConnectionClosed)));
    }

    #[test]
    fn cancelled_requests_are_reaped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let inflight = InFlightRequests::new(tx);

        let (req, handle) = request("a");
        let stream_id = inflight.send(req).unwrap();
        let (req, _other) = request("b");
        inflight.send(req).unwrap();

        handle.cancel();
        assert_eq!(inflight.reap_cancelled(), 1);
        assert_eq!(inflight.len(), 1);
        assert!(!inflight.route(ResponseFrame {
            stream_id,
            response: Response::data_ack(),
        }));
    }

    #[tokio::test]
    async fn malformed_response_fails_its_request() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let inflight = InFlightRequests::new(tx);
        let (req, mut handle) = request("a");
        let stream_id = inflight.send(req).unwrap();

        let routed = inflight
            .handle_inbound(Inbound::Malformed {
                stream_id,
                error: crate::ProtocolError::UnknownOpcode(42),
            })
            .unwrap();
        assert!(routed);
        assert!(matches!(
            handle.acknowledged().await,
            Err(RequestError::Remote(msg)) if msg == "unknown opcode 42"
        ));
    }

    #[test]
    fn handle_frame_rejects_requests() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let inflight = InFlightRequests::new(tx);
        let frame = Frame::new(StreamId(1), crate::Opcode::Startup, Bytes::new()).unwrap();
        assert!(inflight.handle_frame(frame).is_err());
    }
}
