//! Session transport for the APNs delivery client.
//!
//! # Purpose
//! Owns everything that touches the network: the TLS-secured, multiplexed
//! HTTP/2 session to the push gateway, and the client credential material
//! that authenticates it.
//!
//! # How it fits
//! The delivery engine (`apns-client`) never opens a socket. It talks to a
//! [`Session`] — one exchange per push, delivered back as a small stream of
//! [`ExchangeEvent`]s — and reads the session's negotiated stream limit to
//! pace asynchronous dispatch. [`H2Session`] is the production
//! implementation; tests substitute their own.
//!
//! # Key invariants
//! - All socket I/O happens on transport-owned background tasks.
//! - Each exchange delivers its events to exactly one sink; a torn-down
//!   session ends the event stream without a `Closed` marker.
//! - `remote_settings()` reports `None` until the peer has advertised a
//!   concurrent-stream limit.

mod credentials;
mod http2;
mod session;

pub use credentials::{load_identity, CredentialError, CredentialSource, TlsIdentity};
pub use http2::{H2Session, TlsOptions};
pub use session::{ExchangeEvent, RemoteSettings, Session, TransportError, WireRequest};
