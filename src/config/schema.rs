//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the portal proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the portal proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct PortalConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream services the proxy forwards to.
    pub upstream: UpstreamConfig,

    /// Portal-side mount prefixes.
    pub mounts: MountConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Upstream base URLs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the Kubernetes-style control-plane API.
    pub control_plane_url: String,

    /// URL of the GraphQL gateway.
    pub graphql_url: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            control_plane_url: "http://127.0.0.1:8080".to_string(),
            graphql_url: "http://127.0.0.1:8081/graphql".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

/// Where the proxy handlers are mounted on the portal.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MountConfig {
    /// Prefix of the generic passthrough proxy.
    pub proxy_prefix: String,

    /// Prefix of the GraphQL forward.
    pub graphql_prefix: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            proxy_prefix: "/api/proxy".to_string(),
            graphql_prefix: "/api/graphql".to_string(),
        }
    }
}

/// Session cookie configuration.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the signed session cookie.
    pub cookie_name: String,

    /// HMAC key used to verify the cookie signature.
    pub secret: String,

    /// Path segment that stands for "the current user".
    pub subject_placeholder: String,

    /// Segments after which the placeholder is substituted (e.g. `users`).
    pub user_scope_markers: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "portal_session".to_string(),
            secret: String::new(),
            subject_placeholder: "me".to_string(),
            user_scope_markers: vec!["users".to_string()],
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("cookie_name", &self.cookie_name)
            .field("secret", &"<redacted>")
            .field("subject_placeholder", &self.subject_placeholder)
            .field("user_scope_markers", &self.user_scope_markers)
            .finish()
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Length of one counting window in milliseconds.
    pub window_ms: u64,

    /// Maximum requests per key within one window.
    pub limit: u64,

    /// How the caller key is derived.
    pub key: RateLimitKey,

    /// Shared counter store.
    pub store: StoreConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: 60_000,
            limit: 300,
            key: RateLimitKey::Ip,
            store: StoreConfig::default(),
        }
    }
}

/// Caller key strategy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitKey {
    /// Peer socket address.
    Ip,
    /// Left-most `X-Forwarded-For` entry, falling back to the peer address.
    ForwardedFor,
}

/// Counter store backing the rate limiter.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Store implementation.
    pub kind: StoreKind,

    /// Redis URL (required for `redis`).
    pub url: Option<String>,

    /// Prefix for counter keys.
    pub key_prefix: String,

    /// How long startup waits for the store to become ready.
    pub connect_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            url: None,
            key_prefix: "portal:rl".to_string(),
            connect_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// In-process counters. Only correct for a single instance.
    Memory,
    /// Shared Redis counters.
    Redis,
}

/// Request hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,

    /// Replace upstream failure messages with a generic one in 502 bodies.
    pub redact_upstream_errors: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            redact_upstream_errors: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}
