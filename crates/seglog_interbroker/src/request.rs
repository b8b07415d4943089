//! Data request lifecycle.
//!
//! A [`DataRequest`] has two outcomes that resolve independently: the
//! peer's response and the result of the local append. Each outcome has a
//! one-shot resolver on the request and a matching wait on the
//! [`RequestHandle`]. Both waits end as soon as the request's cancellation
//! token fires, and a resolver dropped unresolved ends its wait with
//! [`RequestError::ConnectionClosed`].

use crate::error::{RequestError, RequestResult};
use crate::message::{DataRequestBody, Response};
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Outcome of a local append: `Err` carries the reason sent to the peer.
pub type AppendResult = Result<(), String>;

/// Lifecycle of a request on the sending broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Built but not yet written to the connection.
    Created,
    /// Written; waiting for the peer.
    AwaitingResponse,
    /// The peer answered.
    ResponseReceived,
    /// Canceled before an answer arrived.
    Canceled,
    /// The connection failed before an answer arrived.
    ConnectionError,
}

impl SenderState {
    /// Returns true if no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ResponseReceived | Self::Canceled | Self::ConnectionError
        )
    }

    /// Returns true if `next` may follow `self`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SenderState::*;
        matches!(
            (self, next),
            (Created, AwaitingResponse | Canceled | ConnectionError)
                | (AwaitingResponse, ResponseReceived | Canceled | ConnectionError)
        )
    }
}

/// Lifecycle of a request on the receiving broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Decoded from the connection.
    Received,
    /// Appended to the local segment.
    AppendedLocally,
    /// Acknowledged to the sender.
    AckSent,
    /// Answered with an error.
    ErrorSent,
}

impl ReceiverState {
    /// Returns true if no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AckSent | Self::ErrorSent)
    }

    /// Returns true if `next` may follow `self`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ReceiverState::*;
        matches!(
            (self, next),
            (Received, AppendedLocally | ErrorSent) | (AppendedLocally, AckSent | ErrorSent)
        )
    }
}

/// State of a request on either side of a connection.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Request being sent.
    Sender(SenderState),
    /// Request being received.
    Receiver(ReceiverState),
}

impl RequestState {
    /// Returns true if no further transition is allowed.
    pub fn is_terminal(self) -> bool {
        match self {
            Self::Sender(s) => s.is_terminal(),
            Self::Receiver(s) => s.is_terminal(),
        }
    }

    /// Returns true if `next` may follow `self`. Never crosses sides.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Sender(from), Self::Sender(to)) => from.can_transition_to(to),
            (Self::Receiver(from), Self::Receiver(to)) => from.can_transition_to(to),
            _ => false,
        }
    }
}

impl fmt::Debug for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender(s) => fmt::Debug::fmt(s, f),
            Self::Receiver(s) => fmt::Debug::fmt(s, f),
        }
    }
}

impl From<SenderState> for RequestState {
    fn from(state: SenderState) -> Self {
        Self::Sender(state)
    }
}

impl From<ReceiverState> for RequestState {
    fn from(state: ReceiverState) -> Self {
        Self::Receiver(state)
    }
}

/// A replication request with its resolvers.
pub struct DataRequest {
    body: DataRequestBody,
    state: Mutex<RequestState>,
    response_tx: Mutex<Option<oneshot::Sender<Response>>>,
    append_tx: Mutex<Option<oneshot::Sender<AppendResult>>>,
    cancel: CancellationToken,
}

impl DataRequest {
    /// Creates an outbound request with its own cancellation token.
    pub fn new(body: DataRequestBody) -> (Self, RequestHandle) {
        Self::build(body, SenderState::Created.into(), CancellationToken::new())
    }

    /// Creates an outbound request canceled together with `parent`.
    pub fn with_parent(body: DataRequestBody, parent: &CancellationToken) -> (Self, RequestHandle) {
        Self::build(body, SenderState::Created.into(), parent.child_token())
    }

    /// Creates a request decoded from a peer, canceled together with
    /// `parent`.
    pub fn received(body: DataRequestBody, parent: &CancellationToken) -> (Self, RequestHandle) {
        Self::build(body, ReceiverState::Received.into(), parent.child_token())
    }

    fn build(
        body: DataRequestBody,
        state: RequestState,
        cancel: CancellationToken,
    ) -> (Self, RequestHandle) {
        let (response_tx, response_rx) = oneshot::channel();
        let (append_tx, append_rx) = oneshot::channel();
        let handle = RequestHandle {
            response_rx: Some(response_rx),
            append_rx: Some(append_rx),
            cancel: cancel.clone(),
        };
        let request = Self {
            body,
            state: Mutex::new(state),
            response_tx: Mutex::new(Some(response_tx)),
            append_tx: Mutex::new(Some(append_tx)),
            cancel,
        };
        (request, handle)
    }

    /// Returns the request body.
    pub fn body(&self) -> &DataRequestBody {
        &self.body
    }

    /// Returns the current lifecycle state.
    ///
    /// A sending request whose token has fired reads as
    /// [`SenderState::Canceled`], whoever canceled it.
    pub fn state(&self) -> RequestState {
        let mut state = self.state.lock();
        self.observe_cancel(&mut state);
        *state
    }

    fn observe_cancel(&self, state: &mut RequestState) {
        if let RequestState::Sender(s) = *state {
            if !s.is_terminal() && self.cancel.is_cancelled() {
                *state = SenderState::Canceled.into();
            }
        }
    }

    /// Moves to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidStateTransition`] if `next` may not
    /// follow the current state.
    pub fn transition(&self, next: impl Into<RequestState>) -> RequestResult<()> {
        let next = next.into();
        let mut state = self.state.lock();
        self.observe_cancel(&mut state);
        if !state.can_transition_to(next) {
            return Err(RequestError::invalid_transition(*state, next));
        }
        *state = next;
        Ok(())
    }

    /// Resolves the response wait. Only valid on the sending side while
    /// awaiting a response.
    ///
    /// Returns false if the response was already resolved, the request was
    /// canceled or the handle is gone.
    pub fn set_response(&self, response: Response) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut slot = self.response_tx.lock();
        if slot.is_none() || self.transition(SenderState::ResponseReceived).is_err() {
            return false;
        }
        slot.take().is_some_and(|tx| tx.send(response).is_ok())
    }

    /// Resolves the append wait. A successful append on the receiving side
    /// moves the request to [`ReceiverState::AppendedLocally`].
    ///
    /// Returns false if the result was already resolved, the request was
    /// canceled or the handle is gone.
    pub fn set_append_result(&self, result: AppendResult) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let mut slot = self.append_tx.lock();
        if slot.is_none() {
            return false;
        }
        if result.is_ok()
            && matches!(self.state(), RequestState::Receiver(_))
            && self.transition(ReceiverState::AppendedLocally).is_err()
        {
            return false;
        }
        slot.take().is_some_and(|tx| tx.send(result).is_ok())
    }

    /// Cancels the request. Both waits end with [`RequestError::Canceled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.observe_cancel(&mut self.state.lock());
    }

    /// Returns true once the request has been canceled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the request's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails the request because its connection is gone. Pending waits end
    /// with [`RequestError::ConnectionClosed`].
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            self.observe_cancel(&mut state);
            if let RequestState::Sender(s) = *state {
                if !s.is_terminal() {
                    *state = SenderState::ConnectionError.into();
                }
            }
        }
        self.response_tx.lock().take();
        self.append_tx.lock().take();
    }
}

impl fmt::Debug for DataRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataRequest")
            .field("topic", &self.body.topic)
            .field("segment_id", &self.body.segment_id)
            .field("data_len", &self.body.data.len())
            .field("state", &self.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Waits on the outcomes of a [`DataRequest`].
#[derive(Debug)]
pub struct RequestHandle {
    response_rx: Option<oneshot::Receiver<Response>>,
    append_rx: Option<oneshot::Receiver<AppendResult>>,
    cancel: CancellationToken,
}

impl RequestHandle {
    /// Waits for the peer's response.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Canceled`] once the request is canceled
    /// - [`RequestError::ConnectionClosed`] if the request was dropped or
    ///   closed unresolved
    /// - [`RequestError::AlreadyResolved`] if the response was already taken
    pub async fn response(&mut self) -> RequestResult<Response> {
        if self.cancel.is_cancelled() {
            return Err(RequestError::Canceled);
        }
        let rx = self.response_rx.as_mut().ok_or(RequestError::AlreadyResolved)?;
        let result = wait(&self.cancel, rx).await;
        self.response_rx = None;
        result
    }

    /// Waits for the response and maps an error response to
    /// [`RequestError::Remote`].
    pub async fn acknowledged(&mut self) -> RequestResult<()> {
        match self.response().await? {
            Response::Error { message } => Err(RequestError::Remote(message)),
            Response::Ack { .. } | Response::Data { .. } => Ok(()),
        }
    }

    /// Waits for the local append result.
    ///
    /// # Errors
    ///
    /// As [`RequestHandle::response`], plus [`RequestError::Append`] when
    /// the append failed.
    pub async fn append_result(&mut self) -> RequestResult<()> {
        if self.cancel.is_cancelled() {
            return Err(RequestError::Canceled);
        }
        let rx = self.append_rx.as_mut().ok_or(RequestError::AlreadyResolved)?;
        let result = wait(&self.cancel, rx).await;
        self.append_rx = None;
        result?.map_err(RequestError::Append)
    }

    /// Cancels the request.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once the request has been canceled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn wait<T>(cancel: &CancellationToken, rx: &mut oneshot::Receiver<T>) -> RequestResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RequestError::Canceled),
        received = rx => received.map_err(|_| RequestError::ConnectionClosed),
    }
}
