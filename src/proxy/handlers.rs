//! Proxy route handlers.
//!
//! Per request: `Idle → AuthChecked → Building → InFlight → {Relaying | Aborted | Failed}`.
//! No retries happen here; every failure becomes a response to the caller.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Extension,
};

use crate::http::error::{ProxyError, GENERIC_UPSTREAM_ERROR};
use crate::http::request::{build_upstream_request, UpstreamTarget};
use crate::http::response::{relay, relay_json};
use crate::observability::metrics;
use crate::proxy::abort::{AbortBridge, ClientSignal};
use crate::proxy::upstream::Upstream;
use crate::session::SessionAccessor;

/// Application state injected into the proxy handlers.
#[derive(Clone)]
pub struct ProxyState {
    pub upstream: Arc<dyn Upstream>,
    pub sessions: Arc<dyn SessionAccessor>,
    /// Generic passthrough to the control plane.
    pub passthrough: Arc<UpstreamTarget>,
    /// JSON-only forward to the GraphQL gateway.
    pub graphql: Arc<UpstreamTarget>,
    pub max_body_size: usize,
    pub redact_upstream_errors: bool,
}

/// Any method, any path under the proxy mount.
pub async fn proxy_passthrough(
    State(state): State<ProxyState>,
    signal: Option<Extension<ClientSignal>>,
    request: Request,
) -> Response {
    let target = state.passthrough.clone();
    forward(&state, &target, signal, request).await
}

/// POST under the GraphQL mount.
pub async fn graphql_forward(
    State(state): State<ProxyState>,
    signal: Option<Extension<ClientSignal>>,
    request: Request,
) -> Response {
    let target = state.graphql.clone();
    forward(&state, &target, signal, request).await
}

async fn forward(
    state: &ProxyState,
    target: &UpstreamTarget,
    signal: Option<Extension<ClientSignal>>,
    request: Request,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let signal = signal.map(|Extension(s)| s).unwrap_or_else(ClientSignal::detached);

    let response = match forward_inner(state, target, &signal, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    };

    metrics::record_request(target.name, &method, response.status().as_u16(), start_time);
    response
}

async fn forward_inner(
    state: &ProxyState,
    target: &UpstreamTarget,
    signal: &ClientSignal,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();

    // 1. Authenticate
    let session = match state.sessions.get_session(&parts.headers).await {
        Some(session) => session,
        None => {
            tracing::debug!(route = target.name, path = %parts.uri.path(), "Rejecting unauthenticated request");
            return Err(ProxyError::Unauthenticated);
        }
    };

    // 2. Bridge the abort signal before anything is sent upstream
    let bridge = AbortBridge::attach(signal);

    // 3. Build
    let upstream_request =
        build_upstream_request(&parts, body, &session, target, state.max_body_size).await?;
    let request_id = upstream_request.request_id.clone();

    tracing::debug!(
        request_id = %request_id,
        route = target.name,
        method = %upstream_request.method,
        url = %upstream_request.url,
        "Proxying request"
    );

    // 4. Fetch
    let outcome = bridge
        .guard(state.upstream.send(upstream_request, bridge.signal()))
        .await;

    match outcome {
        Ok(Ok(upstream_response)) => {
            // 5. Relay
            if target.json_only {
                Ok(relay_json(upstream_response))
            } else {
                Ok(relay(upstream_response))
            }
        }
        Ok(Err(_)) | Err(_) if bridge.is_aborted() => {
            tracing::debug!(request_id = %request_id, route = target.name, "Client closed request");
            metrics::record_client_abort(target.name);
            Err(ProxyError::ClientAborted)
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, route = target.name, error = %e, "Upstream error");
            let message = if state.redact_upstream_errors {
                GENERIC_UPSTREAM_ERROR.to_string()
            } else {
                e.to_string()
            };
            Err(ProxyError::Upstream(message))
        }
        Err(_) => Err(ProxyError::ClientAborted),
    }
}
