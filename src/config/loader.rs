//! Configuration loading.
//!
//! Configuration is environment-first: an optional TOML file provides the
//! base, then well-known environment variables override individual fields.
//! Secrets (the JWT shared secret, the store URL) are expected to arrive via
//! the environment.

use std::path::Path;
use std::{env, fs};

use crate::config::schema::{Environment, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Validation(Vec<ValidationError>),
}

/// Load configuration from an optional TOML file plus environment overrides,
/// then validate it.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(p) => toml::from_str(&fs::read_to_string(p)?)?,
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply well-known environment variables on top of the loaded file.
fn apply_env_overrides(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    if let Some(port) = parse_env("PORT")? {
        config.listener.base_port = port;
    }
    if let Some(workers) = parse_env("GATEWAY_WORKERS")? {
        config.listener.workers = workers;
    }
    if let Ok(secret) = env::var("JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Ok(url) = env::var("REDIS_URL") {
        config.store.url = url;
    }
    if let Ok(target) = env::var("TARGET_URL") {
        config.upstream.target_url = target;
    }
    if let Ok(origins) = env::var("CORS_ORIGINS") {
        config.cors.allowed_origins = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Ok(mode) = env::var("GATEWAY_ENV") {
        config.environment = match mode.as_str() {
            "production" => Environment::Production,
            "development" => Environment::Development,
            other => {
                return Err(ConfigError::Env {
                    var: "GATEWAY_ENV",
                    value: other.to_string(),
                })
            }
        };
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value: raw }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fail_validation_without_secret() {
        // Scoped to fields the environment cannot mask in a test runner.
        let config = GatewayConfig::default();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn file_values_parse() {
        let raw = r#"
            environment = "production"

            [listener]
            base_port = 9100
            workers = 4

            [auth]
            jwt_secret = "s3cret"

            [rate_limit]
            max_requests = 5
            window_secs = 60
            on_store_unavailable = "admit"
        "#;
        let config: GatewayConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.listener.base_port, 9100);
        assert_eq!(config.listener.workers, 4);
        assert_eq!(config.rate_limit.max_requests, 5);
        assert!(config.environment.is_production());
        assert!(validate_config(&config).is_ok());
    }
}
