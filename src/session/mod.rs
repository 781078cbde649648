//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request headers
//!     → accessor.rs (find the session cookie among Cookie headers)
//!     → cookie.rs (verify signature, decode, check expiry)
//!     → Some(Session) | None
//! ```
//!
//! # Design Decisions
//! - Read-only: cookies are minted by the login collaborator, never here
//! - Malformed input is indistinguishable from an absent cookie
//! - The access token never appears in Debug output or logs

pub mod accessor;
pub mod cookie;

pub use accessor::{SessionAccessor, SignedCookieSessions};
pub use cookie::SessionCodec;

use std::time::{SystemTime, UNIX_EPOCH};

/// The authenticated caller behind an inbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    /// Subject id of the authenticated user.
    pub subject: String,
    /// Expiry in unix seconds.
    pub expires_at: u64,
}

impl Session {
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("subject", &self.subject)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Current time in unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
