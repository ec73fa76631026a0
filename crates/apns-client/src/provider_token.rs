// Signed bearer tokens for provider-token authentication.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

use crate::error::ApnsResult;

#[derive(Debug, Serialize)]
struct ProviderClaims {
    iss: String,
    iat: u64,
}

/// Builds ES256-signed bearer tokens (`header.payload.signature`, base64url
/// without padding): header `{alg, kid}`, payload `{iss, iat}`.
pub struct ProviderToken {
    encoding_key: EncodingKey,
    team_id: String,
    key_id: String,
}

impl ProviderToken {
    /// Load a P-256 signing key (`.p8`, PKCS#8 PEM). Unusable key material
    /// fails here, before any push is attempted.
    pub fn new(
        key_pem: &[u8],
        team_id: impl Into<String>,
        key_id: impl Into<String>,
    ) -> ApnsResult<Self> {
        let encoding_key = EncodingKey::from_ec_pem(key_pem)?;
        Ok(ProviderToken {
            encoding_key,
            team_id: team_id.into(),
            key_id: key_id.into(),
        })
    }

    /// Sign a fresh token. `iat` is the wall clock at generation time.
    pub fn generate(&self) -> ApnsResult<String> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());
        // The gateway expects exactly {alg, kid}; drop the default typ.
        header.typ = None;
        let claims = ProviderClaims {
            iss: self.team_id.clone(),
            iat: now_epoch_seconds(),
        };
        Ok(jsonwebtoken::encode(&header, &claims, &self.encoding_key)?)
    }
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use jsonwebtoken::DecodingKey;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::nid::Nid;
    use openssl::pkey::PKey;
    use serde_json::{json, Value};

    fn test_key_pair() -> (Vec<u8>, Vec<u8>) {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).expect("p-256 group");
        let key = EcKey::generate(&group).expect("generate key");
        let pkey = PKey::from_ec_key(key).expect("pkey");
        let private_pem = pkey.private_key_to_pem_pkcs8().expect("private pem");
        let public_pem = pkey.public_key_to_pem().expect("public pem");
        (private_pem, public_pem)
    }

    #[test]
    fn token_segments_round_trip() {
        let (private_pem, public_pem) = test_key_pair();
        let provider =
            ProviderToken::new(&private_pem, "TEAM123456", "KEY1234567").expect("provider token");
        let token = provider.generate().expect("generate");

        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);

        let header: Value = serde_json::from_slice(
            &URL_SAFE_NO_PAD.decode(segments[0]).expect("header base64url"),
        )
        .expect("header json");
        assert_eq!(header, json!({"alg": "ES256", "kid": "KEY1234567"}));

        let payload: Value = serde_json::from_slice(
            &URL_SAFE_NO_PAD
                .decode(segments[1])
                .expect("payload base64url"),
        )
        .expect("payload json");
        assert_eq!(payload["iss"], "TEAM123456");
        assert!(payload["iat"].as_u64().expect("iat") > 0);

        let message = format!("{}.{}", segments[0], segments[1]);
        let verified = jsonwebtoken::crypto::verify(
            segments[2],
            message.as_bytes(),
            &DecodingKey::from_ec_pem(&public_pem).expect("public key"),
            Algorithm::ES256,
        )
        .expect("verify");
        assert!(verified, "signature must verify against the public key");
    }

    #[test]
    fn tokens_are_unpadded_base64url() {
        let (private_pem, _) = test_key_pair();
        let provider = ProviderToken::new(&private_pem, "TEAM123456", "KEY1234567").expect("token");
        let token = provider.generate().expect("generate");
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn invalid_key_material_fails_at_construction() {
        let err = ProviderToken::new(b"not a key", "TEAM123456", "KEY1234567");
        assert!(err.is_err());
    }
}
