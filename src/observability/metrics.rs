//! Metrics collection and exposition.
//!
//! # Metrics
//! - `portal_proxy_requests_total` (counter): requests by route, method, status
//! - `portal_proxy_request_duration_seconds` (histogram): latency by route
//! - `portal_proxy_rate_limited_total` (counter): requests rejected with 429
//! - `portal_proxy_rate_limit_store_errors_total` (counter): fail-open decisions
//! - `portal_proxy_client_aborts_total` (counter): requests answered with 499
//!
//! # Design Decisions
//! - Recording without an installed exporter is a no-op, so tests and the
//!   CLI never need to initialize anything

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(route: &'static str, method: &str, status: u16, start: Instant) {
    counter!(
        "portal_proxy_requests_total",
        "route" => route,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("portal_proxy_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("portal_proxy_rate_limited_total").increment(1);
}

pub fn record_store_error() {
    counter!("portal_proxy_rate_limit_store_errors_total").increment(1);
}

pub fn record_client_abort(route: &'static str) {
    counter!("portal_proxy_client_aborts_total", "route" => route).increment(1);
}
