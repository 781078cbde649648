//! Error responses surfaced to the browser.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Non-standard "Client Closed Request" status.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Body used for 502 responses when upstream messages are redacted.
pub const GENERIC_UPSTREAM_ERROR: &str = "Upstream request failed";

/// Every way a proxied request can end without an upstream response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No valid session; the request never reaches the upstream.
    #[error("Unauthorized")]
    Unauthenticated,

    /// The inbound request was aborted before the upstream answered.
    #[error("Client closed request")]
    ClientAborted,

    /// The upstream fetch failed before producing a response.
    #[error("{0}")]
    Upstream(String),

    #[error("Payload Too Large")]
    PayloadTooLarge,

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found")]
    NotFound,

    /// The caller exceeded its quota.
    #[error("Too Many Requests")]
    RateLimited { retry_after_secs: u64 },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ProxyError::ClientAborted => client_closed_request(),
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotFound => StatusCode::NOT_FOUND,
            ProxyError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// 499 Client Closed Request.
pub fn client_closed_request() -> StatusCode {
    // 499 lies inside the 100..=999 range accepted by `from_u16`.
    StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ProxyError::ClientAborted => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = status;
                response
            }
            ProxyError::RateLimited { retry_after_secs } => {
                let mut response =
                    (status, Json(json!({ "error": "Too Many Requests" }))).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt as _;

    async fn into_parts(err: ProxyError) -> (StatusCode, Option<String>, bytes::Bytes) {
        let response = err.into_response();
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, retry_after, body)
    }

    #[tokio::test]
    async fn test_unauthenticated_body() {
        let (status, _, body) = into_parts(ProxyError::Unauthenticated).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(&body[..], br#"{"error":"Unauthorized"}"#);
    }

    #[tokio::test]
    async fn test_client_aborted_is_499_and_empty() {
        let (status, _, body) = into_parts(ProxyError::ClientAborted).await;
        assert_eq!(status.as_u16(), 499);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_message_is_surfaced() {
        let (status, _, body) =
            into_parts(ProxyError::Upstream("connection refused".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "connection refused");
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let (status, retry_after, _) =
            into_parts(ProxyError::RateLimited { retry_after_secs: 60 }).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(retry_after.as_deref(), Some("60"));
    }
}
