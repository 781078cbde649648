//! Liveness endpoint.
//!
//! `/healthz` answers as long as the process serves HTTP. It does not probe
//! the upstreams or the rate limit store; neither affects whether this
//! instance should receive traffic.

use axum::{response::IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn healthz() -> impl IntoResponse {
    Json(Liveness {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
