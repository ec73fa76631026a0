// Client credential loading: PKCS#12 bundles and PEM key+certificate pairs.
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use thiserror::Error;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file not found: {0}")]
    NotFound(String),
    #[error("unable to read credential material: {0}")]
    Io(#[from] std::io::Error),
    #[error("credential material is neither a PKCS#12 bundle nor PEM: {0}")]
    Parse(String),
    #[error("credential bundle is missing its {0}")]
    Incomplete(&'static str),
}

/// Where credential bytes come from. Reader-style inputs are drained once
/// at construction; the resulting bytes are held for the connection's
/// lifetime, so the source is never re-read.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl CredentialSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        CredentialSource::Path(path.into())
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        CredentialSource::Bytes(bytes.into())
    }

    /// Drain a reader into an in-memory source.
    pub fn from_reader(mut reader: impl Read) -> Result<Self, CredentialError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(CredentialSource::Bytes(bytes))
    }

    /// Produce the raw credential bytes. A missing file is a configuration
    /// error, reported before any network attempt is made.
    pub fn read(&self) -> Result<Vec<u8>, CredentialError> {
        match self {
            CredentialSource::Path(path) => {
                if !path.exists() {
                    return Err(CredentialError::NotFound(path.display().to_string()));
                }
                Ok(fs::read(path)?)
            }
            CredentialSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Parsed TLS client identity, ready for the rustls session config.
#[derive(Debug)]
pub struct TlsIdentity {
    pub certs: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Parse credential material without requiring the caller to know its
/// format: PKCS#12 is tried first, then PEM key+certificate.
pub fn load_identity(
    raw: &[u8],
    passphrase: Option<&str>,
) -> Result<TlsIdentity, CredentialError> {
    match parse_pkcs12(raw, passphrase) {
        Ok(identity) => Ok(identity),
        Err(_) => parse_pem(raw, passphrase),
    }
}

fn parse_pkcs12(raw: &[u8], passphrase: Option<&str>) -> Result<TlsIdentity, CredentialError> {
    let parsed = Pkcs12::from_der(raw)
        .and_then(|bundle| bundle.parse2(passphrase.unwrap_or("")))
        .map_err(stack_error)?;
    let key = parsed
        .pkey
        .ok_or(CredentialError::Incomplete("private key"))?;
    let cert = parsed
        .cert
        .ok_or(CredentialError::Incomplete("certificate"))?;

    let mut certs = vec![CertificateDer::from(cert.to_der().map_err(stack_error)?)];
    if let Some(chain) = parsed.ca {
        for extra in chain.iter() {
            certs.push(CertificateDer::from(extra.to_der().map_err(stack_error)?));
        }
    }
    Ok(TlsIdentity {
        certs,
        key: pkcs8_key(&key)?,
    })
}

fn parse_pem(raw: &[u8], passphrase: Option<&str>) -> Result<TlsIdentity, CredentialError> {
    let key = match passphrase {
        Some(passphrase) => PKey::private_key_from_pem_passphrase(raw, passphrase.as_bytes()),
        None => PKey::private_key_from_pem(raw),
    }
    .map_err(stack_error)?;

    let stack = X509::stack_from_pem(raw).map_err(stack_error)?;
    if stack.is_empty() {
        return Err(CredentialError::Incomplete("certificate"));
    }
    let mut certs = Vec::with_capacity(stack.len());
    for cert in stack {
        certs.push(CertificateDer::from(cert.to_der().map_err(stack_error)?));
    }
    Ok(TlsIdentity {
        certs,
        key: pkcs8_key(&key)?,
    })
}

fn pkcs8_key(key: &PKey<Private>) -> Result<PrivateKeyDer<'static>, CredentialError> {
    let der = key.private_key_to_pkcs8().map_err(stack_error)?;
    Ok(PrivateKeyDer::from(PrivatePkcs8KeyDer::from(der)))
}

fn stack_error(err: ErrorStack) -> CredentialError {
    CredentialError::Parse(err.to_string())
}
