//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{HeaderMap, Method},
    response::Response,
    Router,
};
use portal_proxy::config::PortalConfig;
use portal_proxy::session::{Session, SessionCodec};
use portal_proxy::{HttpServer, Shutdown};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";

/// What a mock upstream received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    /// Path plus query, as sent on the wire.
    pub target: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

pub type Recordings = Arc<Mutex<Vec<Recorded>>>;

/// Serve `router` on an ephemeral port.
pub async fn start_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start an upstream that records every request and answers with `reply`.
pub async fn start_recording_upstream<F>(reply: F) -> (SocketAddr, Recordings)
where
    F: Fn() -> Response + Clone + Send + Sync + 'static,
{
    let recordings: Recordings = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .fallback(
            |State((log, reply)): State<(Recordings, F)>, request: Request| async move {
                let (parts, body) = request.into_parts();
                let body = to_bytes(body, usize::MAX).await.unwrap();
                log.lock().unwrap().push(Recorded {
                    method: parts.method,
                    target: parts
                        .uri
                        .path_and_query()
                        .map(|pq| pq.to_string())
                        .unwrap_or_default(),
                    headers: parts.headers,
                    body: body.to_vec(),
                });
                reply()
            },
        )
        .with_state((recordings.clone(), reply));
    (start_upstream(router).await, recordings)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Configuration pointing both mounts at local upstreams.
pub fn test_config(api: SocketAddr, graphql: SocketAddr) -> PortalConfig {
    let mut config = PortalConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.control_plane_url = format!("http://{}", api);
    config.upstream.graphql_url = format!("http://{}/graphql", graphql);
    config.upstream.connect_timeout_secs = 2;
    config.session.secret = SECRET.to_string();
    config
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Run an already built server on an ephemeral port.
pub async fn run_server(server: HttpServer) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (_tx, updates) = mpsc::unbounded_channel();
    let token = shutdown.token();
    let task = tokio::spawn(async move { server.run(listener, updates, token).await });
    RunningProxy {
        addr,
        shutdown,
        task,
    }
}

/// Build the production server from `config` and run it.
pub async fn start_proxy(config: PortalConfig) -> RunningProxy {
    let server = portal_proxy::lifecycle::build_server(config).await.unwrap();
    run_server(server).await
}

/// `Cookie` header value carrying a valid session.
pub fn session_cookie(subject: &str, token: &str) -> String {
    let codec = SessionCodec::new(SECRET.as_bytes()).unwrap();
    let value = codec.seal(&Session {
        access_token: token.to_string(),
        subject: subject.to_string(),
        expires_at: portal_proxy::session::unix_now() + 3600,
    });
    format!("portal_session={}", value)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn empty_ok() -> Response {
    Response::new(Body::empty())
}
