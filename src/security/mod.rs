//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (derive key, increment counter, 429 over the limit)
//!     → store.rs (shared counters: Redis, or in-process for one instance)
//!     → Pass to session lookup and proxy handlers
//! ```
//!
//! # Design Decisions
//! - Fail closed at startup: a shared store that is not ready aborts startup
//! - Fail open at runtime: a store outage lets traffic through
//! - No trust in client input unless `forwarded-for` keying is configured

pub mod rate_limit;
pub mod store;

pub use rate_limit::{rate_limit_middleware, ClientIp, Decision, KeyGenerator, RateLimitSettings, RateLimiter};
pub use store::{CounterStore, MemoryStore, RedisStore, StoreError};
