//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the proxy and GraphQL mounts
//! - Wire up middleware (tracing, request ID, rate limit, client signal)
//! - Bind server to listener
//! - Apply live configuration reloads
//! - Graceful shutdown that also ends open watch streams

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{any, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::watcher::restart_required_changes;
use crate::config::PortalConfig;
use crate::health;
use crate::http::request::{discard_inbound_request_id, PortalRequestId, UpstreamTarget, X_REQUEST_ID};
use crate::proxy::abort::client_signal_middleware;
use crate::proxy::handlers::{graphql_forward, proxy_passthrough, ProxyState};
use crate::proxy::template::SubjectTemplate;
use crate::proxy::upstream::Upstream;
use crate::security::rate_limit::{rate_limit_middleware, RateLimitSettings, RateLimiter};
use crate::session::SessionAccessor;

/// HTTP server for the portal proxy.
pub struct HttpServer {
    router: Router,
    config: PortalConfig,
    limiter: Option<Arc<RateLimiter>>,
    /// Parent of every request's client signal; cancelled on shutdown.
    streams: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server. `limiter` is `None` when rate limiting is off.
    pub fn new(
        config: PortalConfig,
        upstream: Arc<dyn Upstream>,
        sessions: Arc<dyn SessionAccessor>,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Result<Self, url::ParseError> {
        let template = SubjectTemplate::new(
            config.session.subject_placeholder.clone(),
            config.session.user_scope_markers.clone(),
        );
        let passthrough = UpstreamTarget::new(
            "proxy",
            &config.upstream.control_plane_url,
            config.mounts.proxy_prefix.clone(),
            template.clone(),
            false,
        )?;
        let graphql = UpstreamTarget::new(
            "graphql",
            &config.upstream.graphql_url,
            config.mounts.graphql_prefix.clone(),
            template,
            true,
        )?;

        let state = ProxyState {
            upstream,
            sessions,
            passthrough: Arc::new(passthrough),
            graphql: Arc::new(graphql),
            max_body_size: config.security.max_body_size,
            redact_upstream_errors: config.security.redact_upstream_errors,
        };

        let streams = CancellationToken::new();
        let router = Self::build_router(&config, state, limiter.clone(), streams.clone());
        Ok(Self {
            router,
            config,
            limiter,
            streams,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(
        config: &PortalConfig,
        state: ProxyState,
        limiter: Option<Arc<RateLimiter>>,
        streams: CancellationToken,
    ) -> Router {
        let proxy_prefix = config.mounts.proxy_prefix.as_str();
        let graphql_prefix = config.mounts.graphql_prefix.as_str();

        let mut proxied = Router::new()
            .route(proxy_prefix, any(proxy_passthrough))
            .route(&format!("{proxy_prefix}/"), any(proxy_passthrough))
            .route(&format!("{proxy_prefix}/{{*path}}"), any(proxy_passthrough))
            .route(graphql_prefix, post(graphql_forward))
            .route(&format!("{graphql_prefix}/"), post(graphql_forward))
            .route(&format!("{graphql_prefix}/{{*path}}"), post(graphql_forward))
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                streams,
                client_signal_middleware,
            ));

        if let Some(limiter) = limiter {
            proxied = proxied.layer(middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ));
        }

        proxied
            .route("/healthz", get(health::healthz))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(&X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, PortalRequestId))
            .layer(middleware::map_request(discard_inbound_request_id))
    }

    /// The composed router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Configs received on `config_updates` have already been validated.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<PortalConfig>,
        shutdown: CancellationToken,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let limiter = self.limiter.clone();
        let mut current = self.config.clone();
        let reload_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reload_shutdown.cancelled() => break,
                    next = config_updates.recv() => {
                        let Some(next) = next else { break };
                        apply_reload(&current, &next, limiter.as_deref());
                        current = next;
                    }
                }
            }
        });

        // Watch streams never finish on their own; end them so draining completes.
        let streams = self.streams.clone();
        let cutoff = shutdown.clone();
        tokio::spawn(async move {
            cutoff.cancelled().await;
            streams.cancel();
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }
}

fn apply_reload(current: &PortalConfig, next: &PortalConfig, limiter: Option<&RateLimiter>) {
    for section in restart_required_changes(current, next) {
        tracing::warn!(section, "Configuration change takes effect after a restart");
    }

    match limiter {
        Some(limiter) => limiter.reload(RateLimitSettings::from(&next.rate_limit)),
        None if next.rate_limit.enabled => {
            tracing::warn!("Rate limiting enabled in configuration but not started; restart required");
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::UpstreamRequest;
    use crate::proxy::upstream::{UpstreamError, UpstreamResponse};
    use crate::security::store::MemoryStore;
    use crate::security::rate_limit::ClientIp;
    use crate::session::Session;
    use async_trait::async_trait;
    use axum::extract::ConnectInfo;
    use axum::http::{HeaderMap, Method, StatusCode};
    use futures_util::{stream, StreamExt as _};
    use http_body_util::BodyExt as _;
    use std::time::Duration;
    use tower::ServiceExt;

    struct EmptyUpstream;

    #[async_trait]
    impl Upstream for EmptyUpstream {
        async fn send(
            &self,
            _request: UpstreamRequest,
            _signal: CancellationToken,
        ) -> Result<UpstreamResponse, UpstreamError> {
            Ok(UpstreamResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: stream::empty().boxed(),
            })
        }
    }

    struct AlwaysSignedIn;

    #[async_trait]
    impl SessionAccessor for AlwaysSignedIn {
        async fn get_session(&self, _headers: &HeaderMap) -> Option<Session> {
            Some(Session {
                access_token: "token".into(),
                subject: "user-1".into(),
                expires_at: u64::MAX,
            })
        }
    }

    fn server(limiter: Option<Arc<RateLimiter>>) -> HttpServer {
        HttpServer::new(
            PortalConfig::default(),
            Arc::new(EmptyUpstream),
            Arc::new(AlwaysSignedIn),
            limiter,
        )
        .unwrap()
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        request
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = server(None)
            .router()
            .oneshot(request(Method::GET, "/healthz"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_response_carries_request_id() {
        let response = server(None)
            .router()
            .oneshot(request(Method::GET, "/api/proxy/api/v1/namespaces"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = response.headers()[&X_REQUEST_ID].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_inbound_request_id_is_replaced() {
        let mut inbound = request(Method::GET, "/api/proxy/x");
        inbound
            .headers_mut()
            .insert(X_REQUEST_ID, "abc-123".parse().unwrap());
        let response = server(None).router().oneshot(inbound).await.unwrap();
        let id = response.headers()[&X_REQUEST_ID].to_str().unwrap();
        assert_ne!(id, "abc-123");
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_mounts_accept_trailing_slash() {
        let router = server(None).router();
        let proxy = router
            .clone()
            .oneshot(request(Method::GET, "/api/proxy/"))
            .await
            .unwrap();
        assert_eq!(proxy.status(), StatusCode::OK);

        let graphql = router
            .oneshot(request(Method::POST, "/api/graphql/"))
            .await
            .unwrap();
        assert_eq!(graphql.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_graphql_mount_is_post_only() {
        let router = server(None).router();
        let get = router
            .clone()
            .oneshot(request(Method::GET, "/api/graphql"))
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::METHOD_NOT_ALLOWED);

        let post = router
            .oneshot(request(Method::POST, "/api/graphql"))
            .await
            .unwrap();
        assert_eq!(post.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let response = server(None)
            .router()
            .oneshot(request(Method::GET, "/elsewhere"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_healthz_is_not_rate_limited() {
        let limiter = Arc::new(RateLimiter::new(
            RateLimitSettings {
                enabled: true,
                window: Duration::from_secs(60),
                limit: 1,
            },
            ClientIp::default(),
            Arc::new(MemoryStore::new()),
            "test",
        ));
        let router = server(Some(limiter)).router();

        for _ in 0..3 {
            let response = router
                .clone()
                .oneshot(request(Method::GET, "/healthz"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let first = router
            .clone()
            .oneshot(request(Method::GET, "/api/proxy/x"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = router
            .oneshot(request(Method::GET, "/api/proxy/x"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_reload_swaps_limiter_settings() {
        let limiter = RateLimiter::new(
            RateLimitSettings {
                enabled: true,
                window: Duration::from_secs(60),
                limit: 5,
            },
            ClientIp::default(),
            Arc::new(MemoryStore::new()),
            "test",
        );
        let current = PortalConfig::default();
        let mut next = current.clone();
        next.rate_limit.enabled = true;
        next.rate_limit.limit = 2;
        next.rate_limit.window_ms = 1_000;

        apply_reload(&current, &next, Some(&limiter));
        assert_eq!(limiter.settings().limit, 2);
        assert_eq!(limiter.settings().window, Duration::from_secs(1));
    }
}
