//! Upstream fetch.
//!
//! # Responsibilities
//! - Issue one outbound request per inbound request (no retries)
//! - Hand back status, headers, and an unbuffered body stream
//! - End the body stream when the request's abort signal fires
//!
//! # Design Decisions
//! - `reqwest` decodes compressed bodies, so the relay must drop
//!   `content-encoding` before the response reaches the browser
//! - Environment proxies are ignored; upstreams are internal services

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures_util::{stream::BoxStream, StreamExt as _, TryStreamExt as _};
use tokio_util::sync::CancellationToken;

use crate::http::request::UpstreamRequest;

/// Streamed upstream body.
pub type BodyStream = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// Response produced by the upstream, consumed once by the relay.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connection, TLS, or protocol failure before or while streaming.
    #[error("{0}")]
    Transport(String),

    #[error("failed to build upstream client: {0}")]
    Client(String),
}

/// Performs outbound requests.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `request`. `signal` fires when the inbound request is aborted.
    async fn send(
        &self,
        request: UpstreamRequest,
        signal: CancellationToken,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// HTTP upstream backed by a pooled `reqwest` client.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(connect_timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .no_proxy()
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(
        &self,
        request: UpstreamRequest,
        signal: CancellationToken,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(error_chain(&e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(|e| UpstreamError::Transport(error_chain(&e)))
            .take_until(signal.cancelled_owned())
            .boxed();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Render an error with its sources, e.g. `error sending request: connection refused`.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
