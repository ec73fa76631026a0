// Connection-level defaults, gateway endpoints, and authentication modes.
use std::time::Duration;

use apns_transport::CredentialSource;

pub const APPLE_PRODUCTION_HOST: &str = "api.push.apple.com";
pub const APPLE_DEVELOPMENT_HOST: &str = "api.development.push.apple.com";
pub const APPLE_PUSH_PORT: u16 = 443;

pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(30);
// Apple accepts provider tokens for up to an hour; half of that keeps a
// comfortable margin against clock skew on the gateway side.
pub(crate) const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// How often budget waiters and joiners re-check state even without a
/// completion signal. Doubles as the anti-stall escape hatch for a peer
/// that never frees a slot.
pub(crate) const SLOT_RECHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Push gateway address.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn production() -> Self {
        Endpoint {
            host: APPLE_PRODUCTION_HOST.to_string(),
            port: APPLE_PUSH_PORT,
        }
    }

    pub fn development() -> Self {
        Endpoint {
            host: APPLE_DEVELOPMENT_HOST.to_string(),
            port: APPLE_PUSH_PORT,
        }
    }

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Endpoint {
            host: host.into(),
            port,
        }
    }
}

/// The two authentication strategies, selected once per connection.
///
/// Certificate mode authenticates through the session's TLS identity and
/// needs no per-request work; provider-token mode signs a short-lived
/// bearer token that is cached and attached to every request.
#[derive(Debug, Clone)]
pub enum Authentication {
    Certificate {
        source: CredentialSource,
        passphrase: Option<String>,
    },
    ProviderToken {
        key: CredentialSource,
        team_id: String,
        key_id: String,
    },
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: Endpoint,
    pub authentication: Authentication,
    pub connect_timeout: Duration,
    /// Default bound for `Connection::push`.
    pub push_timeout: Duration,
    pub token_ttl: Duration,
}

impl ConnectionConfig {
    /// Certificate-mode config against the production gateway.
    pub fn certificate(source: CredentialSource, passphrase: Option<String>) -> Self {
        Self::new(Authentication::Certificate { source, passphrase })
    }

    /// Provider-token-mode config against the production gateway.
    pub fn provider_token(
        key: CredentialSource,
        team_id: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Self {
        Self::new(Authentication::ProviderToken {
            key,
            team_id: team_id.into(),
            key_id: key_id.into(),
        })
    }

    fn new(authentication: Authentication) -> Self {
        ConnectionConfig {
            endpoint: Endpoint::production(),
            authentication,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
            token_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Target the development gateway instead of production.
    pub fn development(mut self) -> Self {
        self.endpoint = Endpoint::development();
        self
    }
}
