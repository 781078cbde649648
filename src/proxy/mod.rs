//! Proxy core.
//!
//! # Data Flow
//! ```text
//! handlers.rs
//!     → session lookup (401 when absent)
//!     → abort.rs (bridge the client signal to the outbound call)
//!     → template.rs (substitute the subject placeholder)
//!     → upstream.rs (single fetch, streamed body)
//!     → relay, or 499 / 502
//! ```
//!
//! # Design Decisions
//! - No retries: a failed fetch is reported, never repeated
//! - The abort bridge exists before the fetch is issued

pub mod abort;
pub mod handlers;
pub mod template;
pub mod upstream;

pub use abort::{client_signal_middleware, AbortBridge, Aborted, ClientSignal};
pub use handlers::{graphql_forward, proxy_passthrough, ProxyState};
pub use template::SubjectTemplate;
pub use upstream::{HttpUpstream, Upstream, UpstreamError, UpstreamResponse};
