//! Push notification delivery over a persistent, multiplexed HTTP/2
//! session.
//!
//! # Purpose
//! Coordinates a shared network session across concurrent callers:
//! synchronous push with a timeout bound, asynchronous push paced by the
//! session's negotiated concurrency budget, and exactly-once response
//! correlation per request.
//!
//! # How it fits
//! The socket lives in `apns-transport`; this crate only builds requests,
//! enqueues exchanges, and waits. Authentication is selected once per
//! connection: a TLS client certificate, or cached ES256-signed provider
//! tokens attached per request.
//!
//! # Key invariants
//! - Every push produces at most one terminal response (or the explicit
//!   absent outcome); a timed-out wait never sees a later call's response.
//! - Async dispatch never knowingly exceeds the peer's stream limit; an
//!   unadvertised limit is conservatively treated as 1.
//! - A push delayed by the budget is never dropped or failed, only
//!   delayed.
//!
//! # Example
//! ```no_run
//! use apns_client::{AlertNotification, Connection, ConnectionConfig, CredentialSource};
//!
//! # async fn push() -> apns_client::ApnsResult<()> {
//! let config = ConnectionConfig::provider_token(
//!     CredentialSource::path("AuthKey_ABC123DEFG.p8"),
//!     "TEAM123456",
//!     "ABC123DEFG",
//! );
//! let connection = Connection::open(config).await?;
//!
//! let mut notification = AlertNotification::new("device-token");
//! notification.alert = Some("Hello".into());
//! notification.options.topic = Some("com.example.app".into());
//!
//! if let Some(response) = connection.push(&notification).await? {
//!     assert!(response.ok());
//! }
//! connection.close().await;
//! # Ok(())
//! # }
//! ```

mod auth;
pub mod config;
mod connection;
mod error;
mod notification;
mod pool;
mod provider_token;
mod request;
mod response;
mod stream;
mod token_cache;

pub use config::{Authentication, ConnectionConfig, Endpoint};
pub use connection::Connection;
pub use error::{ApnsError, ApnsResult};
pub use notification::{
    AlertNotification, MdmNotification, Notification, NotificationOptions, PushType,
};
pub use pool::ConnectionPool;
pub use provider_token::ProviderToken;
pub use request::Request;
pub use response::{Response, ResponseBody};
pub use stream::PushHandle;
pub use token_cache::TokenCache;

// Re-exported so callers can plug in their own session implementation.
pub use apns_transport::{
    CredentialSource, ExchangeEvent, RemoteSettings, Session, TransportError, WireRequest,
};
