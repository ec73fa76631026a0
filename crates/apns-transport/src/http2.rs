// HTTP/2 session over TLS: the production `Session` implementation.
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use h2::client::{Connection, ResponseFuture, SendRequest};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::credentials::TlsIdentity;
use crate::session::{ExchangeEvent, RemoteSettings, Session, TransportError, WireRequest};

const ERROR_CHANNEL_CAPACITY: usize = 16;

/// TLS knobs for a session.
///
/// `identity` carries the client certificate for certificate-mode
/// authentication; `extra_roots` admits private or test gateways whose
/// certificates are not in the public root set.
#[derive(Default)]
pub struct TlsOptions {
    pub identity: Option<TlsIdentity>,
    pub extra_roots: Vec<CertificateDer<'static>>,
}

impl TlsOptions {
    pub fn with_identity(identity: TlsIdentity) -> Self {
        TlsOptions {
            identity: Some(identity),
            extra_roots: Vec::new(),
        }
    }
}

/// A live HTTP/2 session.
///
/// One background task drives the `h2` connection and is the only code that
/// touches the socket; it also samples the peer's advertised
/// `max_concurrent_streams` on every poll so callers can pace dispatch.
/// Each dispatched exchange gets its own task pumping response events into
/// the caller's sink.
pub struct H2Session {
    send_request: SendRequest<Bytes>,
    authority: String,
    streams: Arc<AtomicUsize>,
    max_concurrent: Arc<AtomicUsize>,
    errors: broadcast::Sender<TransportError>,
    closed: Arc<AtomicBool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl H2Session {
    /// Establish TCP, TLS (ALPN `h2`), and the HTTP/2 handshake, bounded by
    /// `connect_timeout` as a whole.
    pub async fn connect(
        host: &str,
        port: u16,
        tls: TlsOptions,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let config = client_tls_config(tls)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|err| TransportError::Tls(err.to_string()))?;
        let connector = TlsConnector::from(Arc::new(config));

        let establish = async {
            let tcp = TcpStream::connect((host, port))
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?;
            tcp.set_nodelay(true)
                .map_err(|err| TransportError::Connect(err.to_string()))?;
            let stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|err| TransportError::Tls(err.to_string()))?;
            h2::client::handshake(stream)
                .await
                .map_err(TransportError::from)
        };

        let (send_request, connection) = tokio::time::timeout(connect_timeout, establish)
            .await
            .map_err(|_| TransportError::Connect(format!("timed out connecting to {host}:{port}")))??;

        debug!(host, port, "http/2 session established");

        let max_concurrent = Arc::new(AtomicUsize::new(usize::MAX));
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let closed = Arc::new(AtomicBool::new(false));
        let driver = tokio::spawn(drive_connection(
            connection,
            Arc::clone(&max_concurrent),
            errors.clone(),
            Arc::clone(&closed),
        ));

        Ok(H2Session {
            send_request,
            authority: format!("{host}:{port}"),
            streams: Arc::new(AtomicUsize::new(0)),
            max_concurrent,
            errors,
            closed,
            driver: Mutex::new(Some(driver)),
        })
    }
}

#[async_trait::async_trait]
impl Session for H2Session {
    async fn dispatch(
        &self,
        request: WireRequest,
        events: mpsc::UnboundedSender<ExchangeEvent>,
    ) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        // `ready()` waits for the h2 layer to accept a new stream; budget
        // pacing above us keeps this from queueing unboundedly.
        let mut send_request = self.send_request.clone().ready().await?;

        let uri = format!("https://{}{}", self.authority, request.path);
        let mut builder = http::Request::builder().method(request.method).uri(uri);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let wire = builder
            .body(())
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;

        let (response, mut body) = send_request.send_request(wire, false)?;
        body.send_data(request.body, true)?;

        self.streams.fetch_add(1, Ordering::SeqCst);
        let streams = Arc::clone(&self.streams);
        let errors = self.errors.clone();
        let closed = Arc::clone(&self.closed);
        tokio::spawn(async move {
            if let Err(err) = pump_response(response, &events).await {
                if closed.load(Ordering::SeqCst) {
                    debug!(error = %err, "exchange ended during session close");
                } else {
                    warn!(error = %err, "exchange failed");
                    let _ = errors.send(TransportError::from(err));
                }
                // The sink is dropped without a `Closed` marker; the engine
                // resolves the exchange with the absent outcome.
            }
            streams.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(())
    }

    fn stream_count(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }

    fn remote_settings(&self) -> RemoteSettings {
        let advertised = self.max_concurrent.load(Ordering::Relaxed);
        RemoteSettings {
            // h2 reports usize::MAX until the peer's SETTINGS frame lands.
            max_concurrent_streams: if advertised == usize::MAX {
                None
            } else {
                Some(advertised.min(u32::MAX as usize) as u32)
            },
        }
    }

    fn errors(&self) -> broadcast::Receiver<TransportError> {
        self.errors.subscribe()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing http/2 session");
        // Aborting the driver drops the h2 connection, which fails every
        // pending response future and releases their event sinks.
        let driver = self.driver.lock().expect("driver lock").take();
        if let Some(driver) = driver {
            driver.abort();
        }
    }
}

/// Drive the h2 connection to completion, keeping the sampled
/// `max_concurrent_streams` fresh on every poll.
async fn drive_connection<T>(
    mut connection: Connection<T, Bytes>,
    max_concurrent: Arc<AtomicUsize>,
    errors: broadcast::Sender<TransportError>,
    closed: Arc<AtomicBool>,
) where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let result = std::future::poll_fn(|cx| {
        max_concurrent.store(connection.max_concurrent_send_streams(), Ordering::Relaxed);
        Pin::new(&mut connection).poll(cx)
    })
    .await;

    if let Err(err) = result {
        if closed.load(Ordering::SeqCst) {
            debug!(error = %err, "session ended during close");
        } else {
            warn!(error = %err, "http/2 session error");
            let _ = errors.send(TransportError::from(err));
        }
    }
    closed.store(true, Ordering::SeqCst);
}

/// Pump one exchange's response into its event sink: headers, body chunks
/// (releasing flow-control capacity as they arrive), trailers, closure.
async fn pump_response(
    response: ResponseFuture,
    events: &mpsc::UnboundedSender<ExchangeEvent>,
) -> Result<(), h2::Error> {
    let response = response.await?;
    let (parts, mut body) = response.into_parts();

    let mut headers = Vec::with_capacity(parts.headers.len() + 1);
    headers.push((":status".to_string(), parts.status.as_str().to_string()));
    for (name, value) in parts.headers.iter() {
        headers.push((
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        ));
    }
    let _ = events.send(ExchangeEvent::Headers(headers));

    let mut flow_control = body.flow_control().clone();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        let _ = flow_control.release_capacity(chunk.len());
        let _ = events.send(ExchangeEvent::Data(chunk));
    }

    if let Some(trailers) = body.trailers().await? {
        let mut fields = Vec::with_capacity(trailers.len());
        for (name, value) in trailers.iter() {
            fields.push((
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            ));
        }
        let _ = events.send(ExchangeEvent::Headers(fields));
    }

    let _ = events.send(ExchangeEvent::Closed);
    Ok(())
}

fn client_tls_config(tls: TlsOptions) -> Result<ClientConfig, TransportError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    for root in tls.extra_roots {
        roots
            .add(root)
            .map_err(|err| TransportError::Tls(err.to_string()))?;
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let mut config = match tls.identity {
        Some(identity) => builder
            .with_client_auth_cert(identity.certs, identity.key)
            .map_err(|err| TransportError::Tls(err.to_string()))?,
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}
