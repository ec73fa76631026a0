use apns_transport::{CredentialError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApnsError {
    #[error("credential error: {0}")]
    Credentials(#[from] CredentialError),
    #[error("provider token error: {0}")]
    ProviderToken(#[from] jsonwebtoken::errors::Error),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("connection is closed")]
    ConnectionClosed,
}

pub type ApnsResult<T> = Result<T, ApnsError>;
