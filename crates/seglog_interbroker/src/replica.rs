//! Receiving side of replication.

use crate::config::InterbrokerConfig;
use crate::error::{ProtocolResult, RequestError};
use crate::frame::{Frame, Inbound};
use crate::header::{Opcode, StreamId};
use crate::message::{marshal_response, unmarshal_data_request, Response, ResponseFrame};
use crate::request::{DataRequest, ReceiverState};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Answers the frames a peer sends on one connection.
///
/// Data requests are handed to a local appender through a bounded channel.
/// The appender resolves each request with
/// [`DataRequest::set_append_result`] and the handler turns that result
/// into the response frame.
#[derive(Debug, Clone)]
pub struct ReplicaHandler {
    appender: mpsc::Sender<Arc<DataRequest>>,
    shutdown: CancellationToken,
}

impl ReplicaHandler {
    /// Creates a handler and the receiving end of its appender queue.
    ///
    /// Cancelling `shutdown` cancels every request the handler is waiting
    /// on.
    pub fn new(
        config: &InterbrokerConfig,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Receiver<Arc<DataRequest>>) {
        let (appender, requests) = mpsc::channel(config.append_queue_depth.max(1));
        (Self { appender, shutdown }, requests)
    }

    /// Handles one frame. Returns the response to send back, if any.
    ///
    /// A malformed request gets an error response on its own stream; the
    /// connection stays usable. Nothing is returned for requests canceled
    /// by shutdown.
    pub async fn handle_frame(&self, frame: Frame) -> Option<ResponseFrame> {
        let stream_id = frame.stream_id();
        let response = match frame.opcode() {
            Opcode::Startup => Response::Ack { op: Opcode::Ready },
            Opcode::Data => self.handle_data(stream_id, frame.body).await?,
            op => {
                warn!(stream_id = %stream_id, opcode = ?op, "unexpected frame from peer");
                Response::error(format!("unexpected opcode {op:?}"))
            }
        };
        Some(ResponseFrame {
            stream_id,
            response,
        })
    }

    /// Handles one item read off the connection.
    ///
    /// A frame with a bad header is answered with an error on the stream it
    /// arrived on.
    pub async fn handle(&self, inbound: Inbound) -> Option<ResponseFrame> {
        match inbound {
            Inbound::Frame(frame) => self.handle_frame(frame).await,
            Inbound::Malformed { stream_id, error } => {
                warn!(stream_id = %stream_id, error = %error, "malformed frame from peer");
                Some(ResponseFrame {
                    stream_id,
                    response: Response::error(error.to_string()),
                })
            }
        }
    }

    /// Handles one item and encodes the response.
    pub async fn respond(&self, inbound: impl Into<Inbound>) -> ProtocolResult<Option<Bytes>> {
        match self.handle(inbound.into()).await {
            Some(reply) => marshal_response(reply.stream_id, &reply.response).map(Some),
            None => Ok(None),
        }
    }

    async fn handle_data(&self, stream_id: StreamId, body: Bytes) -> Option<Response> {
        let body = match unmarshal_data_request(body) {
            Ok(body) => body,
            Err(err) => {
                warn!(stream_id = %stream_id, error = %err, "malformed data request");
                return Some(Response::error(err.to_string()));
            }
        };

        let (request, mut handle) = DataRequest::received(body, &self.shutdown);
        let request = Arc::new(request);
        debug!(
            stream_id = %stream_id,
            topic = %request.body().topic,
            segment_id = %request.body().segment_id,
            len = request.body().data.len(),
            "received data request"
        );

        if self.appender.send(Arc::clone(&request)).await.is_err() {
            warn!(stream_id = %stream_id, "appender is gone");
            finish(&request, ReceiverState::ErrorSent);
            return Some(Response::error("appender unavailable"));
        }

        match handle.append_result().await {
            Ok(()) => {
                finish(&request, ReceiverState::AckSent);
                Some(Response::data_ack())
            }
            Err(RequestError::Canceled) => {
                debug!(stream_id = %stream_id, "data request canceled");
                None
            }
            Err(RequestError::Append(message)) => {
                finish(&request, ReceiverState::ErrorSent);
                Some(Response::error(message))
            }
            Err(err) => {
                finish(&request, ReceiverState::ErrorSent);
                Some(Response::error(err.to_string()))
            }
        }
    }
}

fn finish(request: &DataRequest, state: ReceiverState) {
    if let Err(err) = request.transition(state) {
        warn!(error = %err, "data request lifecycle out of order");
    }
}
