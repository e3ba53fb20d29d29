//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files; the
//! loader applies environment-variable overrides on top.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (base port, worker count).
    pub listener: ListenerConfig,

    /// Upstream forwarding configuration.
    pub upstream: UpstreamConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Token verification configuration.
    pub auth: AuthConfig,

    /// Shared counter / allow-list store configuration.
    pub store: StoreConfig,

    /// Cross-origin request policy.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Deployment environment mode.
    pub environment: Environment,
}

/// Deployment environment. Affects log formatting and how strictly upstream
/// TLS certificates are verified: production checks them against the web
/// roots, development accepts any certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Listener configuration.
///
/// Worker `i` binds `bind_host:base_port + i`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host address to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// First worker port.
    pub base_port: u16,

    /// Number of worker tasks. 0 = one per available CPU.
    pub workers: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            base_port: 3001,
            workers: 0,
        }
    }
}

/// Upstream forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Target base URL requests are forwarded to (e.g., "http://127.0.0.1:4000").
    pub target_url: String,

    /// Inbound path prefix that selects proxied traffic; stripped before
    /// forwarding.
    pub path_prefix: String,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Total request deadline in seconds (connect + response headers).
    pub request_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            target_url: "http://127.0.0.1:4000".to_string(),
            path_prefix: "/proxy".to_string(),
            connect_timeout_secs: 30,
            request_timeout_secs: 31,
        }
    }
}

/// Policy applied when the shared counter store cannot be reached during
/// admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreUnavailablePolicy {
    /// Fail open: admit the request without counting it.
    Admit,
    /// Fail closed: reject with 429 as if the window were exhausted.
    Reject,
    /// Fail closed: surface a 500 to the client.
    #[default]
    Error,
}

/// Rate limiting configuration. Fixed-window counting, shared across all
/// workers through the counter store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum requests per client identity per window.
    pub max_requests: u64,

    /// Window duration in seconds.
    pub window_secs: u64,

    /// What to do when the counter store is unreachable.
    pub on_store_unavailable: StoreUnavailablePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 15 * 60,
            on_store_unavailable: StoreUnavailablePolicy::Error,
        }
    }
}

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret used for HS256 signature verification.
    ///
    /// Empty by default so that a missing `JWT_SECRET` fails validation
    /// instead of silently accepting forged tokens.
    pub jwt_secret: String,

    /// Token lifetime in seconds on the signing path.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 60 * 60,
        }
    }
}

/// Shared state store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Redis connection URL.
    pub url: String,

    /// Key prefix for rate-limit counters.
    pub rate_limit_prefix: String,

    /// Key under which allow-list entries are stored.
    pub allow_list_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            rate_limit_prefix: "rate-limit".to_string(),
            allow_list_key: "no-auth-routes".to_string(),
        }
    }
}

/// Cross-origin request policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. Empty = allow any origin (development posture).
    pub allowed_origins: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
