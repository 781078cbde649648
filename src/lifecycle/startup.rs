//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize collaborators in dependency order
//! - Start background tasks owned by them (memory store sweeper)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - A shared counter store must be ready before traffic is accepted;
//!   runtime outages of that store are tolerated by the limiter instead

use std::sync::Arc;
use std::time::Duration;

use crate::config::{PortalConfig, RateLimitConfig, StoreKind};
use crate::http::HttpServer;
use crate::proxy::upstream::{HttpUpstream, UpstreamError};
use crate::security::rate_limit::{ClientIp, RateLimitSettings, RateLimiter};
use crate::security::store::{CounterStore, MemoryStore, RedisStore, StoreError};
use crate::session::cookie::InvalidKey;
use crate::session::{SessionCodec, SignedCookieSessions};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid upstream url: {0}")]
    UpstreamUrl(#[from] url::ParseError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    SessionKey(#[from] InvalidKey),

    #[error("rate limit store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("rate limit store url missing")]
    MissingStoreUrl,
}

/// Build the server and everything it depends on.
pub async fn build_server(config: PortalConfig) -> Result<HttpServer, StartupError> {
    let upstream = HttpUpstream::new(Duration::from_secs(config.upstream.connect_timeout_secs))?;

    let codec = SessionCodec::new(config.session.secret.as_bytes())?;
    let sessions = SignedCookieSessions::new(config.session.cookie_name.clone(), codec);

    let limiter = build_limiter(&config.rate_limit).await?;

    let server = HttpServer::new(config, Arc::new(upstream), Arc::new(sessions), limiter)?;
    Ok(server)
}

/// Build the rate limiter, or `None` when it is disabled.
pub async fn build_limiter(
    config: &RateLimitConfig,
) -> Result<Option<Arc<RateLimiter>>, StartupError> {
    if !config.enabled {
        tracing::info!("Rate limiting disabled");
        return Ok(None);
    }

    let store: Arc<dyn CounterStore> = match config.store.kind {
        StoreKind::Memory => {
            tracing::warn!("Using in-process rate limit counters; limits are per instance");
            let store = Arc::new(MemoryStore::new());
            MemoryStore::spawn_sweeper(&store, Duration::from_millis(config.window_ms.max(1_000)));
            store as Arc<dyn CounterStore>
        }
        StoreKind::Redis => {
            let url = config.store.url.as_deref().ok_or(StartupError::MissingStoreUrl)?;
            let timeout = Duration::from_millis(config.store.connect_timeout_ms);
            Arc::new(RedisStore::connect(url, timeout).await?)
        }
    };

    Ok(Some(Arc::new(RateLimiter::new(
        RateLimitSettings::from(config),
        ClientIp::from_key(config.key),
        store,
        config.store.key_prefix.clone(),
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_limiter_is_not_built() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        assert!(build_limiter(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_limiter_uses_configured_settings() {
        let config = RateLimitConfig {
            enabled: true,
            window_ms: 2_000,
            limit: 7,
            ..RateLimitConfig::default()
        };
        let limiter = build_limiter(&config).await.unwrap().unwrap();
        assert_eq!(limiter.settings().limit, 7);
        assert_eq!(limiter.settings().window, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_startup() {
        let mut config = RateLimitConfig {
            enabled: true,
            ..RateLimitConfig::default()
        };
        config.store.kind = StoreKind::Redis;
        config.store.url = Some("redis://127.0.0.1:1".to_string());
        config.store.connect_timeout_ms = 300;

        let result = build_limiter(&config).await;
        assert!(matches!(result, Err(StartupError::Store(StoreError::NotReady(_)))));
    }

    #[tokio::test]
    async fn test_redis_without_url_fails_startup() {
        let mut config = RateLimitConfig {
            enabled: true,
            ..RateLimitConfig::default()
        };
        config.store.kind = StoreKind::Redis;
        assert!(matches!(
            build_limiter(&config).await,
            Err(StartupError::MissingStoreUrl)
        ));
    }

    #[tokio::test]
    async fn test_build_server_from_defaults() {
        let server = build_server(PortalConfig::default()).await.unwrap();
        assert_eq!(server.config().mounts.proxy_prefix, "/api/proxy");
    }
}
