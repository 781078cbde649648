//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay the upstream status verbatim
//! - Drop headers describing a transport encoding already undone upstream
//! - Stream the body through without buffering it
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body (watch streams never end)
//! - Only `content-encoding` and `transfer-encoding` are removed

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};

use crate::proxy::upstream::UpstreamResponse;

/// Response headers never relayed to the browser.
pub const STRIPPED_RESPONSE_HEADERS: [HeaderName; 2] =
    [header::CONTENT_ENCODING, header::TRANSFER_ENCODING];

pub fn strip_transport_headers(headers: &mut HeaderMap) {
    for name in STRIPPED_RESPONSE_HEADERS {
        headers.remove(name);
    }
}

/// Turn an upstream response into the browser-facing response.
pub fn relay(upstream: UpstreamResponse) -> Response {
    let UpstreamResponse {
        status,
        mut headers,
        body,
    } = upstream;
    strip_transport_headers(&mut headers);

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Relay with a fixed `application/json` content type.
pub fn relay_json(upstream: UpstreamResponse) -> Response {
    let mut response = relay(upstream);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}
