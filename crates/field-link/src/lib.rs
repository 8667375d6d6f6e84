pub mod doctor;
pub mod endpoint;
pub mod feed;
pub mod transport;

use bytes::Bytes;
use field_proto::envelope::Envelope;
use serde::Serialize;
use std::marker::PhantomData;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

pub use endpoint::Endpoint;
pub use feed::{DetectionFeed, Feed, TelemetryFeed};
pub use field_proto::state::ConnectionState;
use transport::MAX_FRAME_BYTES;

pub use transport::{Connector, SessionHandle, TcpConnector, TransportEvent};

/// What a consumer sees from a feed, one event at a time, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent<T> {
    Opened,
    Closed,
    Payload(T),
    Failed(String),
}

/// Identifies one activation. Events carrying an id that is no longer the
/// active one are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(u64);

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("feed is not connected (state: {0})")]
    NotConnected(ConnectionState),
    #[error("outbound queue full")]
    QueueFull,
    #[error("session closed")]
    SessionGone,
    #[error("outbound message too large: {0} bytes")]
    TooLarge(usize),
    #[error("encode outbound message: {0}")]
    Encode(#[from] serde_json::Error),
}

struct ActiveSession {
    id: SessionId,
    events: mpsc::Receiver<TransportEvent>,
    outbound: mpsc::Sender<Bytes>,
    task: Option<JoinHandle<()>>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.events.close();
        if let Some(t) = self.task.take() {
            t.abort();
        }
    }
}

/// Owns at most one live session to a feed endpoint and tracks its state.
///
/// There is no reconnection policy: once a session closes or fails, the
/// manager stays put until `activate` is called again.
pub struct ConnectionManager<F: Feed> {
    endpoint: Endpoint,
    state: ConnectionState,
    latest: Option<F::Payload>,
    session: Option<ActiveSession>,
    next_id: u64,
    _feed: PhantomData<F>,
}

impl<F: Feed> ConnectionManager<F> {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            state: ConnectionState::Disconnected,
            latest: None,
            session: None,
            next_id: 0,
            _feed: PhantomData,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Most recent payload received on any session of this manager.
    pub fn latest(&self) -> Option<&F::Payload> {
        self.latest.as_ref()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn activate<C: Connector + ?Sized>(&mut self, connector: &C) -> SessionId {
        let handle = connector.open(&self.endpoint);
        self.attach(handle)
    }

    /// Installs an already-open session. Any previous session is torn down first.
    pub fn attach(&mut self, handle: SessionHandle) -> SessionId {
        if self.session.is_some() {
            self.teardown();
        }
        self.next_id += 1;
        let id = SessionId(self.next_id);
        self.session = Some(ActiveSession {
            id,
            events: handle.events,
            outbound: handle.outbound,
            task: handle.task,
        });
        self.state = ConnectionState::Connecting;
        info!("link[{}]: connecting to {}", F::NAME, self.endpoint);
        id
    }

    /// Waits for the next event of the active session. Returns `None` when
    /// there is no active session. Cancel safe.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent<F::Payload>> {
        loop {
            let session = self.session.as_mut()?;
            let id = session.id;
            // a transport that vanished without a word counts as closed
            let raw = session.events.recv().await.unwrap_or(TransportEvent::Closed);
            if let Some(ev) = self.dispatch(id, raw) {
                return Some(ev);
            }
        }
    }

    /// Applies one transport event. Events from any session other than the
    /// active one are ignored and leave state and payload untouched.
    pub fn dispatch(&mut self, id: SessionId, raw: TransportEvent) -> Option<ConnectionEvent<F::Payload>> {
        match &self.session {
            Some(s) if s.id == id => {}
            _ => {
                debug!("link[{}]: dropping late event from stale session {:?}", F::NAME, id);
                return None;
            }
        }

        match raw {
            TransportEvent::Opened => {
                self.state = ConnectionState::Connected;
                info!("link[{}]: connected to {}", F::NAME, self.endpoint);
                Some(ConnectionEvent::Opened)
            }
            TransportEvent::Frame(body) => match feed::decode_payload::<F>(&body) {
                Ok(Some(p)) => {
                    self.latest = Some(p.clone());
                    Some(ConnectionEvent::Payload(p))
                }
                Ok(None) => None,
                Err(e) => {
                    warn!("link[{}]: skipping malformed message: {:#}", F::NAME, e);
                    None
                }
            },
            TransportEvent::Closed => {
                self.end_session(ConnectionState::Disconnected);
                info!("link[{}]: closed", F::NAME);
                Some(ConnectionEvent::Closed)
            }
            TransportEvent::Failed(reason) => {
                self.end_session(ConnectionState::Error);
                warn!("link[{}]: transport error: {}", F::NAME, reason);
                Some(ConnectionEvent::Failed(reason))
            }
        }
    }

    /// Sends one message on the active session without waiting.
    pub fn emit<T: Serialize>(&mut self, event: &str, data: &T) -> Result<(), LinkError> {
        if self.state != ConnectionState::Connected {
            return Err(LinkError::NotConnected(self.state));
        }
        let session = self.session.as_ref().ok_or(LinkError::SessionGone)?;
        let body = Envelope::new(event, data)?.encode()?;
        if body.len() > MAX_FRAME_BYTES {
            return Err(LinkError::TooLarge(body.len()));
        }
        session.outbound.try_send(Bytes::from(body)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => LinkError::SessionGone,
        })
    }

    /// Releases the transport. Safe to call any number of times.
    pub fn teardown(&mut self) {
        if let Some(s) = self.session.take() {
            debug!("link[{}]: tearing down session {:?}", F::NAME, s.id);
            drop(s);
            self.state = ConnectionState::Disconnected;
            info!("link[{}]: released {}", F::NAME, self.endpoint);
        }
    }

    fn end_session(&mut self, state: ConnectionState) {
        self.session = None;
        self.state = state;
    }
}

impl ConnectionManager<DetectionFeed> {
    pub fn send_frame(&mut self, data_uri: &str) -> Result<(), LinkError> {
        self.emit(DetectionFeed::OUTBOUND_EVENT, &data_uri)
    }
}

impl<F: Feed> Drop for ConnectionManager<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}
