//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for every inbound request
//! - Rewrite the portal path onto the upstream base URL
//! - Compute outbound headers (bearer token, correlation id, content type)
//! - Read the inbound body once and forward it verbatim
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Body size limit enforced while reading, not after
//! - Only an explicit set of headers crosses the proxy boundary

use axum::{
    body::Body,
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Method, Request},
};
use bytes::Bytes;
use http_body_util::{BodyExt as _, LengthLimitError, Limited};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;
use uuid::Uuid;

use crate::http::error::ProxyError;
use crate::proxy::template::SubjectTemplate;
use crate::session::Session;

/// Header carrying the request correlation id in both directions.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Generates a UUID v4 request id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortalRequestId;

impl MakeRequestId for PortalRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Drop any client-supplied request id so the id layer always mints a fresh one.
pub async fn discard_inbound_request_id(mut request: Request<Body>) -> Request<Body> {
    request.headers_mut().remove(&X_REQUEST_ID);
    request
}

/// Request id of an inbound request, generating one if the layer did not run.
pub fn request_id_of(headers: &HeaderMap) -> String {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// One upstream service and how portal paths map onto it.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    /// Label used in logs and metrics.
    pub name: &'static str,
    pub base_url: Url,
    pub mount_prefix: String,
    pub template: SubjectTemplate,
    /// Force `application/json` on the way out and on the way back.
    pub json_only: bool,
}

impl UpstreamTarget {
    pub fn new(
        name: &'static str,
        base_url: &str,
        mount_prefix: impl Into<String>,
        template: SubjectTemplate,
        json_only: bool,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            name,
            base_url: Url::parse(base_url)?,
            mount_prefix: mount_prefix.into(),
            template,
            json_only,
        })
    }
}

/// A fully built outbound request.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// `None` for GET and HEAD.
    pub body: Option<Bytes>,
    pub request_id: String,
}

/// Strip the mount prefix from an inbound path.
///
/// Returns `None` when the path is not under the mount.
pub fn rewrite_path<'a>(path: &'a str, mount_prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(mount_prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Whether any segment of `path` is `.` or `..`, percent-encoded or not.
///
/// URL parsing resolves such segments, which would let a request climb out
/// of the upstream base path.
pub fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let segment = segment.to_ascii_lowercase().replace("%2e", ".");
        segment == "." || segment == ".."
    })
}

/// Append a rewritten path and the inbound query to the upstream base URL.
///
/// The query keeps its bytes and percent-escapes, except that URL
/// serialization escapes `'` as `%27` for http(s).
pub fn upstream_url(base: &Url, rewritten: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    let joined = format!("{}{}", base.path().trim_end_matches('/'), rewritten);
    url.set_path(if joined.is_empty() { "/" } else { &joined });
    url.set_query(query.filter(|q| !q.is_empty()));
    url
}

/// Whether the method's inbound body is read and forwarded.
pub fn forwards_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

/// Compute the outbound header set.
pub fn upstream_headers(
    inbound: &HeaderMap,
    method: &Method,
    session: &Session,
    request_id: &str,
    json_only: bool,
) -> Result<HeaderMap, ProxyError> {
    let mut headers = HeaderMap::new();

    let json = HeaderValue::from_static("application/json");
    if json_only {
        headers.insert(header::CONTENT_TYPE, json);
    } else if let Some(content_type) = inbound.get(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, content_type.clone());
    } else if forwards_body(method) {
        headers.insert(header::CONTENT_TYPE, json);
    }

    if let Some(accept) = inbound.get(header::ACCEPT) {
        headers.insert(header::ACCEPT, accept.clone());
    }

    // A token that cannot be a header value is as good as no session.
    let bearer = HeaderValue::from_str(&format!("Bearer {}", session.access_token))
        .map_err(|_| ProxyError::Unauthenticated)?;
    headers.insert(header::AUTHORIZATION, bearer);

    if let Ok(id) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, id);
    }

    Ok(headers)
}

/// Read the inbound body once, verbatim, within `limit` bytes.
pub async fn read_body(method: &Method, body: Body, limit: usize) -> Result<Option<Bytes>, ProxyError> {
    if !forwards_body(method) {
        return Ok(None);
    }
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(Some(collected.to_bytes())),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(ProxyError::PayloadTooLarge),
        Err(e) => Err(ProxyError::BadRequest(format!("failed to read request body: {}", e))),
    }
}

/// Build the outbound request for an authenticated inbound request.
pub async fn build_upstream_request(
    parts: &Parts,
    body: Body,
    session: &Session,
    target: &UpstreamTarget,
    max_body_size: usize,
) -> Result<UpstreamRequest, ProxyError> {
    let rewritten = rewrite_path(parts.uri.path(), &target.mount_prefix).ok_or(ProxyError::NotFound)?;
    let path = target.template.apply(rewritten, &session.subject);
    if has_dot_segment(&path) {
        return Err(ProxyError::BadRequest("path contains dot segments".into()));
    }
    let url = upstream_url(&target.base_url, &path, parts.uri.query());

    let request_id = request_id_of(&parts.headers);
    let headers = upstream_headers(&parts.headers, &parts.method, session, &request_id, target.json_only)?;
    let body = read_body(&parts.method, body, max_body_size).await?;

    Ok(UpstreamRequest {
        method: parts.method.clone(),
        url,
        headers,
        body,
        request_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            access_token: "tok".into(),
            subject: "u_123".into(),
            expires_at: u64::MAX,
        }
    }

    fn target(base: &str, prefix: &str, json_only: bool) -> UpstreamTarget {
        UpstreamTarget::new(
            "test",
            base,
            prefix,
            SubjectTemplate::new("me", vec!["users".into()]),
            json_only,
        )
        .unwrap()
    }

    #[test]
    fn test_rewrite_path() {
        assert_eq!(rewrite_path("/api/proxy/users/me", "/api/proxy"), Some("/users/me"));
        assert_eq!(rewrite_path("/api/proxy", "/api/proxy"), Some(""));
        assert_eq!(rewrite_path("/api/proxyfoo", "/api/proxy"), None);
        assert_eq!(rewrite_path("/other", "/api/proxy"), None);
    }

    #[test]
    fn test_upstream_url_keeps_base_path_and_query() {
        let base = Url::parse("https://cp.example.com/apis/").unwrap();
        let url = upstream_url(&base, "/v1/projects", Some("watch=true&labelSelector=a%3Db"));
        assert_eq!(
            url.as_str(),
            "https://cp.example.com/apis/v1/projects?watch=true&labelSelector=a%3Db"
        );

        let gql = Url::parse("https://gql.example.com/graphql").unwrap();
        assert_eq!(upstream_url(&gql, "", None).as_str(), "https://gql.example.com/graphql");
    }

    #[test]
    fn test_upstream_url_query_escapes_are_kept() {
        let base = Url::parse("http://cp.test/apis").unwrap();
        let query = "fieldSelector=status.phase%21%3DRunning&q=a+b&x=%2F&empty=&flag";
        let url = upstream_url(&base, "/pods", Some(query));
        assert_eq!(url.query(), Some(query));

        let quoted = upstream_url(&base, "/pods", Some("name='x'"));
        assert_eq!(quoted.query(), Some("name=%27x%27"));
    }

    #[test]
    fn test_has_dot_segment() {
        assert!(has_dot_segment("/../../admin"));
        assert!(has_dot_segment("/a/./b"));
        assert!(has_dot_segment("/a/%2e%2E/b"));
        assert!(has_dot_segment("/a/.%2e"));
        assert!(has_dot_segment("/a\\..\\b"));
        assert!(!has_dot_segment("/a/..b/c.d/..."));
        assert!(!has_dot_segment(""));
    }

    #[tokio::test]
    async fn test_build_rejects_path_escaping_base() {
        let (parts, body) = Request::builder()
            .method(Method::GET)
            .uri("/api/proxy/../../../admin/secrets")
            .body(Body::empty())
            .unwrap()
            .into_parts();

        let result = build_upstream_request(
            &parts,
            body,
            &session(),
            &target("https://cp.test/apis/portal/v1", "/api/proxy", false),
            1024,
        )
        .await;
        assert!(matches!(result, Err(ProxyError::BadRequest(_))));
    }

    #[test]
    fn test_headers_for_get_have_no_default_content_type() {
        let headers = upstream_headers(&HeaderMap::new(), &Method::GET, &session(), "rid", false).unwrap();
        assert!(headers.get(header::CONTENT_TYPE).is_none());
        assert_eq!(headers[header::AUTHORIZATION], "Bearer tok");
        assert_eq!(headers[&X_REQUEST_ID], "rid");
    }

    #[test]
    fn test_headers_default_json_for_body_methods() {
        let headers = upstream_headers(&HeaderMap::new(), &Method::PATCH, &session(), "rid", false).unwrap();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_headers_forward_inbound_content_type() {
        let mut inbound = HeaderMap::new();
        inbound.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/merge-patch+json"),
        );
        inbound.insert(header::COOKIE, HeaderValue::from_static("portal_session=abc"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer spoofed"));

        let headers = upstream_headers(&inbound, &Method::PATCH, &session(), "rid", false).unwrap();
        assert_eq!(headers[header::CONTENT_TYPE], "application/merge-patch+json");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer tok");
        assert!(headers.get(header::COOKIE).is_none());
    }

    #[test]
    fn test_json_only_overrides_content_type() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let headers = upstream_headers(&inbound, &Method::POST, &session(), "rid", true).unwrap();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_unencodable_token_is_unauthenticated() {
        let mut bad = session();
        bad.access_token = "line\nbreak".into();
        let result = upstream_headers(&HeaderMap::new(), &Method::GET, &bad, "rid", false);
        assert!(matches!(result, Err(ProxyError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_build_substitutes_subject() {
        let (parts, body) = Request::builder()
            .method(Method::GET)
            .uri("/api/proxy/users/me/preferences")
            .header(&X_REQUEST_ID, "req-1")
            .body(Body::from("ignored for GET"))
            .unwrap()
            .into_parts();

        let request = build_upstream_request(
            &parts,
            body,
            &session(),
            &target("http://cp.test", "/api/proxy", false),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(request.url.as_str(), "http://cp.test/users/u_123/preferences");
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.body, None);
        assert_eq!(request.request_id, "req-1");
        assert_eq!(request.headers[header::AUTHORIZATION], "Bearer tok");
    }

    #[tokio::test]
    async fn test_build_forwards_body_bytes_verbatim() {
        let payload: &[u8] = b"{ \"name\" :\t\"caf\xc3\xa9\",  \"n\": 1.50 }\n";
        let (parts, body) = Request::builder()
            .method(Method::PUT)
            .uri("/api/proxy/projects/p1")
            .body(Body::from(payload))
            .unwrap()
            .into_parts();

        let request = build_upstream_request(
            &parts,
            body,
            &session(),
            &target("http://cp.test", "/api/proxy", false),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(request.body.as_deref(), Some(payload));
    }

    #[tokio::test]
    async fn test_read_body_enforces_limit() {
        let result = read_body(&Method::POST, Body::from(vec![b'x'; 64]), 16).await;
        assert!(matches!(result, Err(ProxyError::PayloadTooLarge)));
    }
}
