//! Portal request proxy library.
//!
//! Authenticated, same-origin proxying of browser requests to the control
//! plane API and the GraphQL gateway, with per-caller rate limiting.

// Core subsystems
pub mod config;
pub mod http;
pub mod proxy;
pub mod session;

// Cross-cutting concerns
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::PortalConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
