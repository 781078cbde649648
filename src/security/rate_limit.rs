//! Fixed-window rate limiting in front of the proxy handlers.
//!
//! The limiter runs before the session lookup, so a rejected request costs
//! one counter increment and nothing else. Counter store failures let the
//! request through.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{RateLimitConfig, RateLimitKey};
use crate::http::error::ProxyError;
use crate::observability::metrics;
use crate::security::store::CounterStore;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The reloadable part of the limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window: Duration,
    pub limit: u64,
}

impl RateLimitSettings {
    /// `Retry-After` value: the window length in whole seconds, at least 1.
    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_millis().div_ceil(1000).max(1) as u64
    }
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            window: Duration::from_millis(config.window_ms),
            limit: config.limit,
        }
    }
}

/// Derives the counter key of a request. `None` means the request is not limited.
pub trait KeyGenerator: Send + Sync {
    fn key(&self, request: &Request) -> Option<String>;
}

impl<F> KeyGenerator for F
where
    F: Fn(&Request) -> Option<String> + Send + Sync,
{
    fn key(&self, request: &Request) -> Option<String> {
        self(request)
    }
}

/// Keys requests by client address.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIp {
    /// Use the left-most `X-Forwarded-For` entry when present.
    pub trust_forwarded: bool,
}

impl ClientIp {
    pub fn from_key(key: RateLimitKey) -> Self {
        Self {
            trust_forwarded: key == RateLimitKey::ForwardedFor,
        }
    }
}

impl KeyGenerator for ClientIp {
    fn key(&self, request: &Request) -> Option<String> {
        if self.trust_forwarded {
            let forwarded = request
                .headers()
                .get(X_FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(client) = forwarded {
                return Some(client.to_string());
            }
        }
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    }
}

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Limited { retry_after_secs: u64 },
    /// No decision could be made; the request goes through.
    FailedOpen,
}

pub struct RateLimiter {
    settings: ArcSwap<RateLimitSettings>,
    key_generator: Box<dyn KeyGenerator>,
    store: Arc<dyn CounterStore>,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(
        settings: RateLimitSettings,
        key_generator: impl KeyGenerator + 'static,
        store: Arc<dyn CounterStore>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            settings: ArcSwap::from_pointee(settings),
            key_generator: Box::new(key_generator),
            store,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn settings(&self) -> RateLimitSettings {
        **self.settings.load()
    }

    /// Swap in new settings. Counters already in the store keep their expiry.
    pub fn reload(&self, settings: RateLimitSettings) {
        let previous = self.settings();
        if previous != settings {
            tracing::info!(
                enabled = settings.enabled,
                window_ms = settings.window.as_millis() as u64,
                limit = settings.limit,
                "Rate limit settings reloaded"
            );
        }
        self.settings.store(Arc::new(settings));
    }

    /// Derive the counter key for `request`.
    ///
    /// Runs before any await so the request is never borrowed across one.
    pub fn key_for(&self, request: &Request) -> Option<String> {
        self.key_generator.key(request)
    }

    /// Count one hit against `key`. A missing key fails open.
    pub async fn check(&self, key: Option<String>) -> Decision {
        let settings = self.settings();
        if !settings.enabled {
            return Decision::Allowed;
        }

        let Some(key) = key else {
            tracing::warn!("No rate limit key for request");
            return Decision::FailedOpen;
        };
        let counter_key = format!("{}:{}", self.key_prefix, key);

        match self.store.increment(&counter_key, settings.window).await {
            Ok(count) if count > settings.limit => Decision::Limited {
                retry_after_secs: settings.retry_after_secs(),
            },
            Ok(_) => Decision::Allowed,
            Err(e) => {
                tracing::warn!(error = %e, "Rate limit store unavailable, allowing request");
                metrics::record_store_error();
                Decision::FailedOpen
            }
        }
    }
}

/// Reject requests over the limit with 429 before they reach the handlers.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = limiter.key_for(&request);
    match limiter.check(key).await {
        Decision::Limited { retry_after_secs } => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limited();
            ProxyError::RateLimited { retry_after_secs }.into_response()
        }
        Decision::Allowed | Decision::FailedOpen => next.run(request).await,
    }
}
