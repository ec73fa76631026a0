// Session lifecycle, synchronous push, and budgeted asynchronous dispatch.
//
// Concurrency model: the transport owns the socket on its own background
// tasks; everything here only enqueues work and waits on synchronization
// primitives. The one piece of shared mutable state is the dispatch budget,
// guarded by a single mutex around the check/increment pair so two
// concurrent dispatches cannot race past the same slot.
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apns_transport::{
    load_identity, ExchangeEvent, H2Session, Session, TlsOptions, TransportError, WireRequest,
};
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tracing::{debug, warn};

use crate::auth::Authenticator;
use crate::config::{Authentication, ConnectionConfig, SLOT_RECHECK_INTERVAL};
use crate::error::{ApnsError, ApnsResult};
use crate::notification::Notification;
use crate::request::Request;
use crate::response::Response;
use crate::stream::{collect_response, PushHandle};

type ErrorHandler = Box<dyn Fn(&TransportError) + Send + Sync + 'static>;

struct DispatchState {
    // The very first dispatch goes out before settings negotiation has
    // completed, so it skips the budget check entirely.
    first_dispatch_done: bool,
    // Engine-side count of open exchanges. The transport's own stream
    // count is consulted alongside it; with negotiation lag neither view
    // alone is authoritative.
    in_flight: usize,
}

struct Shared {
    session: Arc<dyn Session>,
    state: Mutex<DispatchState>,
    // Signaled on every exchange completion so budget waiters and joiners
    // can re-check.
    slot_freed: Notify,
    // Async dispatches queued behind the budget gate but not yet on the
    // wire; join() must cover these too.
    queued: AtomicUsize,
    closed: AtomicBool,
    error_handlers: Mutex<Vec<ErrorHandler>>,
}

/// A client connection: one persistent, multiplexed session to the
/// gateway, shared by any number of concurrent callers.
pub struct Connection {
    config: ConnectionConfig,
    authenticator: Authenticator,
    shared: Arc<Shared>,
    error_forwarder: tokio::task::JoinHandle<()>,
}

impl Connection {
    /// Validate credentials, establish the session, and start observing
    /// its error channel. Credential problems surface here, before any
    /// network attempt.
    pub async fn open(config: ConnectionConfig) -> ApnsResult<Self> {
        let authenticator = Authenticator::from_config(&config)?;
        let tls = match &config.authentication {
            Authentication::Certificate { source, passphrase } => {
                let raw = source.read()?;
                TlsOptions::with_identity(load_identity(&raw, passphrase.as_deref())?)
            }
            Authentication::ProviderToken { .. } => TlsOptions::default(),
        };
        let session = H2Session::connect(
            &config.endpoint.host,
            config.endpoint.port,
            tls,
            config.connect_timeout,
        )
        .await?;
        debug!(host = %config.endpoint.host, "connection established");
        Ok(Self::build(Arc::new(session), authenticator, config))
    }

    /// Run the engine over a caller-provided session. Token-mode key
    /// material is still validated; certificate material is the session's
    /// concern here.
    pub fn with_session(session: Arc<dyn Session>, config: ConnectionConfig) -> ApnsResult<Self> {
        let authenticator = Authenticator::from_config(&config)?;
        Ok(Self::build(session, authenticator, config))
    }

    fn build(
        session: Arc<dyn Session>,
        authenticator: Authenticator,
        config: ConnectionConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            session,
            state: Mutex::new(DispatchState {
                first_dispatch_done: false,
                in_flight: 0,
            }),
            slot_freed: Notify::new(),
            queued: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            error_handlers: Mutex::new(Vec::new()),
        });
        let error_forwarder = spawn_error_forwarder(Arc::clone(&shared));
        Connection {
            config,
            authenticator,
            shared,
            error_forwarder,
        }
    }

    /// Push and wait for the gateway's answer, bounded by the configured
    /// default timeout.
    pub async fn push(&self, notification: &dyn Notification) -> ApnsResult<Option<Response>> {
        self.push_with_timeout(notification, Some(self.config.push_timeout))
            .await
    }

    /// Push and wait, bounded by `timeout` (`None` waits indefinitely).
    ///
    /// A timeout is the absent outcome (`Ok(None)`), not an error: the
    /// in-flight exchange is not retracted, and its late completion is
    /// discarded rather than delivered to a subsequent call.
    pub async fn push_with_timeout(
        &self,
        notification: &dyn Notification,
        timeout: Option<Duration>,
    ) -> ApnsResult<Option<Response>> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(ApnsError::ConnectionClosed);
        }
        let request = self.build_request(notification)?;

        self.shared.mark_dispatched();
        let events = match open_exchange(&self.shared, request).await {
            Ok(events) => events,
            Err(err) => {
                self.shared.release_slot();
                return Err(err);
            }
        };

        let (result_tx, result_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = collect_response(events).await;
            shared.release_slot();
            // The receiver is gone if the caller timed out; the late
            // response is discarded here, never redelivered.
            let _ = result_tx.send(outcome);
        });

        let outcome = match timeout {
            Some(bound) => match tokio::time::timeout(bound, result_rx).await {
                Ok(received) => received.unwrap_or(None),
                Err(_elapsed) => None,
            },
            None => result_rx.await.unwrap_or(None),
        };
        Ok(outcome)
    }

    /// Build the request and pre-register a handle against an exchange
    /// that has not been dispatched yet, so listeners can attach before
    /// anything touches the wire. Authorization is injected here, once.
    pub fn prepare(&self, notification: &dyn Notification) -> ApnsResult<PushHandle> {
        Ok(PushHandle::new(self.build_request(notification)?))
    }

    /// Dispatch a prepared push. Returns immediately; the wire write
    /// happens on a background task once a concurrency-budget slot is
    /// available. Budget exhaustion delays the push, it never drops or
    /// fails it. Wakeup order among contending waiters is best-effort,
    /// not FIFO.
    pub fn dispatch(&self, handle: PushHandle) {
        let PushHandle { request, listeners } = handle;
        let shared = Arc::clone(&self.shared);
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            run_dispatch(&shared, request, listeners).await;
            shared.queued.fetch_sub(1, Ordering::SeqCst);
            shared.slot_freed.notify_waiters();
        });
    }

    /// Block until every outstanding exchange (dispatched or still queued
    /// behind the budget) has completed, or the session closes. Returns
    /// `false` if the timeout elapsed first.
    pub async fn join(&self, timeout: Option<Duration>) -> bool {
        let wait = async {
            loop {
                let notified = self.shared.slot_freed.notified();
                if self.idle() || self.shared.closed.load(Ordering::SeqCst) {
                    return;
                }
                tokio::select! {
                    _ = notified => {}
                    _ = tokio::time::sleep(SLOT_RECHECK_INTERVAL) => {}
                }
            }
        };
        match timeout {
            Some(bound) => tokio::time::timeout(bound, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        }
    }

    /// Tear the session down and release every waiter. Idempotent.
    /// Outstanding pushes resolve with the absent outcome; queued async
    /// dispatches are abandoned.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing connection");
        self.shared.session.close().await;
        self.error_forwarder.abort();
        self.shared.slot_freed.notify_waiters();
    }

    /// Register an observer for session-level transport errors. Every
    /// handler sees every forwarded error; errors are never raised into an
    /// unrelated call's stack.
    pub fn on_error(&self, handler: impl Fn(&TransportError) + Send + Sync + 'static) {
        self.shared
            .error_handlers
            .lock()
            .expect("error handler lock")
            .push(Box::new(handler));
    }

    /// Exchanges currently open on the session.
    pub fn stream_count(&self) -> usize {
        self.shared.session.stream_count()
    }

    fn build_request(&self, notification: &dyn Notification) -> ApnsResult<WireRequest> {
        let authorization = self.authenticator.authorization()?;
        Ok(Request::new(notification, authorization.as_deref()).into_wire())
    }

    fn idle(&self) -> bool {
        if self.shared.queued.load(Ordering::SeqCst) > 0 {
            return false;
        }
        let state = self.shared.state.lock().expect("dispatch state lock");
        state.in_flight == 0 && self.shared.session.stream_count() == 0
    }
}

impl Shared {
    /// Record a dispatch that bypasses the budget gate (sync pushes, and
    /// implicitly the first dispatch).
    fn mark_dispatched(&self) {
        let mut state = self.state.lock().expect("dispatch state lock");
        state.first_dispatch_done = true;
        state.in_flight += 1;
    }

    /// Wait-never-fail budget gate. Returns `false` only if the
    /// connection closed while waiting.
    async fn acquire_slot(&self) -> bool {
        loop {
            let notified = self.slot_freed.notified();
            if self.closed.load(Ordering::SeqCst) {
                return false;
            }
            {
                let mut state = self.state.lock().expect("dispatch state lock");
                if !state.first_dispatch_done {
                    state.first_dispatch_done = true;
                    state.in_flight += 1;
                    return true;
                }
                let limit = self.effective_limit();
                // Re-check the transport's own count as well; our
                // bookkeeping can lag behind its negotiation.
                let current = state.in_flight.max(self.session.stream_count());
                if current < limit {
                    state.in_flight += 1;
                    return true;
                }
            }
            // Wake on a completion signal, with a periodic re-check in
            // case the peer raises the limit without any exchange
            // completing.
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(SLOT_RECHECK_INTERVAL) => {}
            }
        }
    }

    fn effective_limit(&self) -> usize {
        match self.session.remote_settings().max_concurrent_streams {
            Some(limit) => limit.max(1) as usize,
            // The peer has not advertised a limit yet: assume the most
            // conservative budget rather than unbounded fan-out.
            None => 1,
        }
    }

    fn release_slot(&self) {
        let mut state = self.state.lock().expect("dispatch state lock");
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.slot_freed.notify_one();
    }

    fn forward_error(&self, error: &TransportError) {
        let handlers = self.error_handlers.lock().expect("error handler lock");
        for handler in handlers.iter() {
            handler(error);
        }
    }
}

async fn open_exchange(
    shared: &Shared,
    request: WireRequest,
) -> ApnsResult<mpsc::UnboundedReceiver<ExchangeEvent>> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    shared.session.dispatch(request, events_tx).await?;
    Ok(events_rx)
}

/// One async push, end to end: budget gate, wire write, response
/// collection, listener fan-out.
async fn run_dispatch(
    shared: &Arc<Shared>,
    request: WireRequest,
    listeners: Vec<crate::stream::ResponseListener>,
) {
    if !shared.acquire_slot().await {
        debug!("dispatch abandoned: connection closed");
        return;
    }
    let events = match open_exchange(shared, request).await {
        Ok(events) => events,
        Err(err) => {
            shared.release_slot();
            warn!(error = %err, "async dispatch failed");
            if let ApnsError::Transport(transport_err) = &err {
                shared.forward_error(transport_err);
            }
            return;
        }
    };
    let outcome = collect_response(events).await;
    shared.release_slot();
    match outcome {
        Some(response) => {
            for listener in listeners {
                listener(response.clone());
            }
        }
        // Session closed mid-exchange: the absent outcome has no response
        // event to deliver.
        None => debug!("exchange ended without a response"),
    }
}

fn spawn_error_forwarder(shared: Arc<Shared>) -> tokio::task::JoinHandle<()> {
    let mut errors = shared.session.errors();
    tokio::spawn(async move {
        loop {
            match errors.recv().await {
                Ok(error) => {
                    warn!(error = %error, "session error");
                    shared.forward_error(&error);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session error channel lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
