//! Configuration validation.
//!
//! Semantic checks on top of what serde already guarantees syntactically.
//! Returns all violations, not just the first, so an operator can fix a bad
//! config in one pass.

use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic violation found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a configuration. Pure function: no I/O, no mutation.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::new(
            "auth.jwt_secret",
            "must be set (JWT_SECRET)",
        ));
    }

    match Url::parse(&config.upstream.target_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            if url.host_str().is_none() {
                errors.push(ValidationError::new(
                    "upstream.target_url",
                    "missing host",
                ));
            }
        }
        Ok(url) => {
            errors.push(ValidationError::new(
                "upstream.target_url",
                format!("unsupported scheme '{}' (expected http or https)", url.scheme()),
            ));
        }
        Err(e) => {
            errors.push(ValidationError::new(
                "upstream.target_url",
                format!("not a valid URL: {e}"),
            ));
        }
    }

    if !config.upstream.path_prefix.starts_with('/') {
        errors.push(ValidationError::new(
            "upstream.path_prefix",
            "must start with '/'",
        ));
    }

    if config.upstream.request_timeout_secs <= config.upstream.connect_timeout_secs {
        errors.push(ValidationError::new(
            "upstream.request_timeout_secs",
            "must exceed connect_timeout_secs",
        ));
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new(
            "rate_limit.max_requests",
            "must be at least 1",
        ));
    }
    if config.rate_limit.window_secs == 0 {
        errors.push(ValidationError::new(
            "rate_limit.window_secs",
            "must be at least 1 second",
        ));
    }

    // Worker ports must not wrap past the u16 range.
    let workers = config.listener.workers.max(1);
    if u32::from(config.listener.base_port) + workers as u32 > u32::from(u16::MAX) {
        errors.push(ValidationError::new(
            "listener.base_port",
            "base_port + workers exceeds the valid port range",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::GatewayConfig;

    fn valid_config() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.auth.jwt_secret = "test-secret".into();
        config
    }

    #[test]
    fn accepts_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = valid_config();
        config.auth.jwt_secret.clear();
        config.rate_limit.max_requests = 0;
        config.upstream.target_url = "not a url".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn accepts_https_upstream() {
        let mut config = valid_config();
        config.upstream.target_url = "https://backend.internal:8443".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn rejects_non_http_upstream() {
        let mut config = valid_config();
        config.upstream.target_url = "ftp://example.com".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_port_range_overflow() {
        let mut config = valid_config();
        config.listener.base_port = 65_530;
        config.listener.workers = 10;
        assert!(validate_config(&config).is_err());
    }
}
