//! Signed session cookie codec.
//!
//! Wire format: `base64url(json) "." base64url(hmac_sha256(json))`, both
//! unpadded. The JSON payload is `{"accessToken", "sub", "expiresAt"}` with
//! `expiresAt` in unix seconds.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::Session;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
#[error("invalid session signing key")]
pub struct InvalidKey;

#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "accessToken")]
    access_token: String,
    sub: String,
    #[serde(rename = "expiresAt")]
    expires_at: u64,
}

/// Seals and opens session cookie values with a shared HMAC key.
#[derive(Clone)]
pub struct SessionCodec {
    mac: HmacSha256,
}

impl SessionCodec {
    pub fn new(secret: &[u8]) -> Result<Self, InvalidKey> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| InvalidKey)?;
        Ok(Self { mac })
    }

    /// Encode and sign a session into a cookie value.
    pub fn seal(&self, session: &Session) -> String {
        let claims = Claims {
            access_token: session.access_token.clone(),
            sub: session.subject.clone(),
            expires_at: session.expires_at,
        };
        // Serializing a struct of strings and integers cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();

        let mut mac = self.mac.clone();
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// Verify and decode a cookie value.
    ///
    /// Any malformed, forged, incomplete, or expired value yields `None`.
    pub fn open(&self, value: &str, now: u64) -> Option<Session> {
        let (payload_b64, signature_b64) = value.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&signature).ok()?;

        let claims: Claims = serde_json::from_slice(&payload).ok()?;
        if claims.access_token.is_empty() || claims.sub.is_empty() {
            return None;
        }

        let session = Session {
            access_token: claims.access_token,
            subject: claims.sub,
            expires_at: claims.expires_at,
        };
        if session.is_expired_at(now) {
            return None;
        }
        Some(session)
    }
}
