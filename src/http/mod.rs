//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, layers, routes)
//!     → request.rs (request ID, path rewrite, outbound headers, body)
//!     → proxy handlers (session, abort bridge, upstream fetch)
//!     → response.rs (strip transport headers, stream body)
//!     → error.rs (401 / 413 / 429 / 499 / 502 bodies)
//!     → Send to client
//! ```

pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use error::ProxyError;
pub use request::{PortalRequestId, X_REQUEST_ID};
pub use server::HttpServer;
