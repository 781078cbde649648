//! Session lookup for inbound requests.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use super::{unix_now, Session, SessionCodec};

/// Resolves the authenticated session of an inbound request.
///
/// `None` means unauthenticated. Implementations must not fail on malformed
/// input; it is treated exactly like a missing session.
#[async_trait]
pub trait SessionAccessor: Send + Sync {
    async fn get_session(&self, headers: &HeaderMap) -> Option<Session>;
}

/// Sessions carried in a signed cookie.
#[derive(Clone)]
pub struct SignedCookieSessions {
    cookie_name: String,
    codec: SessionCodec,
}

impl SignedCookieSessions {
    pub fn new(cookie_name: impl Into<String>, codec: SessionCodec) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            codec,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Resolve the session at a fixed point in time.
    pub fn session_at(&self, headers: &HeaderMap, now: u64) -> Option<Session> {
        let value = find_cookie(headers, &self.cookie_name)?;
        let session = self.codec.open(value, now);
        if session.is_none() {
            tracing::debug!(cookie = %self.cookie_name, "Session cookie rejected");
        }
        session
    }
}

#[async_trait]
impl SessionAccessor for SignedCookieSessions {
    async fn get_session(&self, headers: &HeaderMap) -> Option<Session> {
        self.session_at(headers, unix_now())
    }
}

/// Find a cookie value by name across all `Cookie` headers.
pub fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}
