// End-to-end exercise of `H2Session` against a local h2-over-TLS echo server.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use h2::server;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use apns_transport::{ExchangeEvent, H2Session, Session, TlsOptions, TransportError, WireRequest};

const MAX_STREAMS: u32 = 7;

/// Echo server: responds 200, mirrors the request body and the `apns-id`
/// header back to the client.
async fn start_echo_server() -> (SocketAddr, CertificateDer<'static>) {
    let cert =
        rcgen::generate_simple_self_signed(vec!["localhost".into()]).expect("generate certificate");
    let cert_der = CertificateDer::from(cert.serialize_der().expect("certificate der"));
    let key_der = PrivatePkcs8KeyDer::from(cert.get_key_pair().serialize_der());

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der.into())
        .expect("server tls config");
    config.alpn_protocols = vec![b"h2".to_vec()];
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let tls = match acceptor.accept(socket).await {
                    Ok(tls) => tls,
                    Err(_) => return,
                };
                let mut connection = match server::Builder::new()
                    .max_concurrent_streams(MAX_STREAMS)
                    .handshake::<_, Bytes>(tls)
                    .await
                {
                    Ok(connection) => connection,
                    Err(_) => return,
                };
                while let Some(accepted) = connection.accept().await {
                    let (request, mut respond) = match accepted {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    tokio::spawn(async move {
                        let (parts, mut body) = request.into_parts();
                        let mut echoed = Vec::new();
                        let mut flow_control = body.flow_control().clone();
                        while let Some(chunk) = body.data().await {
                            let chunk = match chunk {
                                Ok(chunk) => chunk,
                                Err(_) => return,
                            };
                            let _ = flow_control.release_capacity(chunk.len());
                            echoed.extend_from_slice(&chunk);
                        }
                        let mut response = http::Response::builder().status(200);
                        if let Some(id) = parts.headers.get("apns-id") {
                            response = response.header("apns-id", id);
                        }
                        let response = response.body(()).expect("response");
                        let mut stream = match respond.send_response(response, false) {
                            Ok(stream) => stream,
                            Err(_) => return,
                        };
                        let _ = stream.send_data(Bytes::from(echoed), true);
                    });
                }
            });
        }
    });

    (addr, cert_der)
}

async fn connect(addr: SocketAddr, root: CertificateDer<'static>) -> H2Session {
    H2Session::connect(
        "localhost",
        addr.port(),
        TlsOptions {
            identity: None,
            extra_roots: vec![root],
        },
        Duration::from_secs(5),
    )
    .await
    .expect("connect")
}

fn push_request(body: &str) -> WireRequest {
    WireRequest {
        method: http::Method::POST,
        path: "/3/device/0123abcd".to_string(),
        headers: vec![("apns-id".to_string(), "echo-me".to_string())],
        body: Bytes::from(body.to_string()),
    }
}

async fn collect(
    mut events: mpsc::UnboundedReceiver<ExchangeEvent>,
) -> (Vec<(String, String)>, Vec<u8>, bool) {
    let mut headers = Vec::new();
    let mut body = Vec::new();
    let mut closed = false;
    while let Some(event) = events.recv().await {
        match event {
            ExchangeEvent::Headers(fields) => headers.extend(fields),
            ExchangeEvent::Data(chunk) => body.extend_from_slice(&chunk),
            ExchangeEvent::Closed => {
                closed = true;
                break;
            }
        }
    }
    (headers, body, closed)
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(field, _)| field == name)
        .map(|(_, value)| value.as_str())
}

#[tokio::test]
async fn exchange_round_trip() {
    let (addr, root) = start_echo_server().await;
    let session = connect(addr, root).await;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    session
        .dispatch(push_request(r#"{"aps":{"alert":"hi"}}"#), events_tx)
        .await
        .expect("dispatch");

    let (headers, body, closed) = collect(events_rx).await;
    assert!(closed, "exchange must close");
    assert_eq!(header(&headers, ":status"), Some("200"));
    assert_eq!(header(&headers, "apns-id"), Some("echo-me"));
    assert_eq!(body, br#"{"aps":{"alert":"hi"}}"#);

    // The exchange has completed; the stream count must drain.
    for _ in 0..50 {
        if session.stream_count() == 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.stream_count(), 0);
}

#[tokio::test]
async fn remote_settings_reflect_the_peer_limit() {
    let (addr, root) = start_echo_server().await;
    let session = connect(addr, root).await;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    session
        .dispatch(push_request("{}"), events_tx)
        .await
        .expect("dispatch");
    let (_, _, closed) = collect(events_rx).await;
    assert!(closed);

    // Settings land with the server preface; by the time an exchange has
    // completed the sampled value must be the advertised limit.
    let mut advertised = None;
    for _ in 0..100 {
        advertised = session.remote_settings().max_concurrent_streams;
        if advertised.is_some() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(advertised, Some(MAX_STREAMS));
}

#[tokio::test]
async fn close_rejects_new_dispatches() {
    let (addr, root) = start_echo_server().await;
    let session = connect(addr, root).await;

    session.close().await;
    session.close().await; // idempotent

    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    let err = session
        .dispatch(push_request("{}"), events_tx)
        .await
        .expect_err("dispatch after close must fail");
    assert!(matches!(err, TransportError::Closed));
}
