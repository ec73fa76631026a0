// Per-connection authentication strategy.
use std::sync::Arc;

use crate::config::{Authentication, ConnectionConfig};
use crate::error::ApnsResult;
use crate::provider_token::ProviderToken;
use crate::token_cache::TokenCache;

/// The single capability both auth modes supply: produce a per-request
/// authorization value. Certificate mode produces none (the session's TLS
/// identity already encodes authentication); token mode serves the cached
/// signed bearer token.
pub(crate) enum Authenticator {
    Certificate,
    Token(TokenCache<String>),
}

impl Authenticator {
    /// Validates token key material eagerly; a bad signing key surfaces
    /// here, not on the first push.
    pub(crate) fn from_config(config: &ConnectionConfig) -> ApnsResult<Self> {
        match &config.authentication {
            Authentication::Certificate { .. } => Ok(Authenticator::Certificate),
            Authentication::ProviderToken {
                key,
                team_id,
                key_id,
            } => {
                let raw = key.read()?;
                let provider =
                    Arc::new(ProviderToken::new(&raw, team_id.clone(), key_id.clone())?);
                Ok(Authenticator::Token(TokenCache::new(
                    config.token_ttl,
                    move || provider.generate(),
                )))
            }
        }
    }

    /// Fetched once per request, immediately before headers are built.
    pub(crate) fn authorization(&self) -> ApnsResult<Option<String>> {
        match self {
            Authenticator::Certificate => Ok(None),
            Authenticator::Token(cache) => cache.get().map(Some),
        }
    }
}
