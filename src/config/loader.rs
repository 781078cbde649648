//! Configuration loading from disk and environment.

use std::path::Path;
use std::fs;
use crate::config::schema::PortalConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `upstream.control_plane_url`.
pub const ENV_API_URL: &str = "PORTAL_API_URL";
/// Environment variable overriding `upstream.graphql_url`.
pub const ENV_GRAPHQL_URL: &str = "PORTAL_GRAPHQL_URL";
/// Environment variable overriding `session.secret`.
pub const ENV_SESSION_SECRET: &str = "PORTAL_SESSION_SECRET";
/// Environment variable overriding `rate_limit.store.url`.
pub const ENV_REDIS_URL: &str = "PORTAL_REDIS_URL";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PortalConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config: PortalConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment, for running without a file.
pub fn load_from_env() -> Result<PortalConfig, ConfigError> {
    let mut config = PortalConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overlay environment-provided values onto a parsed configuration.
pub fn apply_env_overrides<F>(config: &mut PortalConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_API_URL) {
        config.upstream.control_plane_url = url;
    }
    if let Some(url) = lookup(ENV_GRAPHQL_URL) {
        config.upstream.graphql_url = url;
    }
    if let Some(secret) = lookup(ENV_SESSION_SECRET) {
        config.session.secret = secret;
    }
    if let Some(url) = lookup(ENV_REDIS_URL) {
        config.rate_limit.store.url = Some(url);
    }
}
