// Collaborator surface between the delivery engine and the network session.
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// Errors surfaced by a session.
///
/// Variants carry rendered messages rather than source errors so they can be
/// fanned out over a broadcast channel to every registered observer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("http/2 error: {0}")]
    Http2(String),
    #[error("request could not be encoded: {0}")]
    InvalidRequest(String),
    #[error("session is closed")]
    Closed,
}

impl From<h2::Error> for TransportError {
    fn from(err: h2::Error) -> Self {
        TransportError::Http2(err.to_string())
    }
}

/// One request as handed to the session: everything above the framing layer.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: http::Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Events a session emits for a single exchange, in order: zero or more
/// `Headers` blocks (trailers arrive as a second block), any number of
/// `Data` chunks, then `Closed` exactly once. A session that tears down
/// mid-exchange drops the sink without sending `Closed`.
#[derive(Debug, Clone)]
pub enum ExchangeEvent {
    Headers(Vec<(String, String)>),
    Data(Bytes),
    Closed,
}

/// Peer-advertised session settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteSettings {
    /// `None` until the peer has advertised a limit. Callers pacing
    /// dispatch must treat `None` conservatively, not as unbounded.
    pub max_concurrent_streams: Option<u32>,
}

/// A persistent, multiplexed session to the gateway.
///
/// Implementations own the socket; callers only enqueue exchanges and
/// observe events. `dispatch` writes the request to the wire and returns as
/// soon as it is accepted; the response flows into `events` asynchronously.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Open a new exchange on the session and send the request.
    async fn dispatch(
        &self,
        request: WireRequest,
        events: mpsc::UnboundedSender<ExchangeEvent>,
    ) -> Result<(), TransportError>;

    /// Number of exchanges currently open on the session.
    fn stream_count(&self) -> usize;

    /// Latest settings advertised by the peer.
    fn remote_settings(&self) -> RemoteSettings;

    /// Subscribe to session-level errors. Errors are broadcast to every
    /// subscriber; they are never raised into an unrelated call stack.
    fn errors(&self) -> broadcast::Receiver<TransportError>;

    /// Tear the session down promptly. Idempotent. Open exchanges end
    /// their event streams without a `Closed` marker.
    async fn close(&self);
}
