//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check upstream URLs are absolute http(s) URLs
//! - Validate value ranges (windows > 0, limits > 0, body size > 0)
//! - Detect conflicting mount prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PortalConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use url::Url;

use crate::config::schema::{PortalConfig, StoreKind};

/// Minimum HMAC key length accepted for the session cookie.
pub const MIN_SECRET_LEN: usize = 32;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &PortalConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&mut errors, "upstream.control_plane_url", &config.upstream.control_plane_url);
    check_url(&mut errors, "upstream.graphql_url", &config.upstream.graphql_url);

    check_prefix(&mut errors, "mounts.proxy_prefix", &config.mounts.proxy_prefix);
    check_prefix(&mut errors, "mounts.graphql_prefix", &config.mounts.graphql_prefix);
    if config.mounts.proxy_prefix == config.mounts.graphql_prefix {
        errors.push(ValidationError::new(
            "mounts.graphql_prefix",
            "must differ from mounts.proxy_prefix",
        ));
    }

    let session = &config.session;
    if session.cookie_name.is_empty() {
        errors.push(ValidationError::new("session.cookie_name", "must not be empty"));
    }
    if session.secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::new(
            "session.secret",
            format!("must be at least {} bytes", MIN_SECRET_LEN),
        ));
    }
    if session.subject_placeholder.is_empty() || session.subject_placeholder.contains('/') {
        errors.push(ValidationError::new(
            "session.subject_placeholder",
            "must be a single non-empty path segment",
        ));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.enabled {
        if rate_limit.limit == 0 {
            errors.push(ValidationError::new("rate_limit.limit", "must be greater than 0"));
        }
        if rate_limit.window_ms == 0 {
            errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
        }
        if rate_limit.store.kind == StoreKind::Redis
            && rate_limit.store.url.as_deref().map_or(true, str::is_empty)
        {
            errors.push(ValidationError::new(
                "rate_limit.store.url",
                "is required for the redis store",
            ));
        }
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported URL '{}' (expected http or https)", url),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
    }
}

fn check_prefix(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if !value.starts_with('/') || value.len() < 2 || value.ends_with('/') {
        errors.push(ValidationError::new(
            field,
            "must start with '/' and must not end with '/'",
        ));
    }
}
