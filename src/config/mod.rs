//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → PortalConfig (validated, immutable)
//!     → handed to each component at construction time
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → rate limiter settings swapped atomically
//!     → other sections logged as restart-required
//! ```
//!
//! # Design Decisions
//! - No ambient globals: components receive their section explicitly
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::PortalConfig;
pub use schema::{
    ListenerConfig, LogFormat, MountConfig, ObservabilityConfig, RateLimitConfig, RateLimitKey,
    SecurityConfig, SessionConfig, StoreConfig, StoreKind, UpstreamConfig,
};
