//! Fixed-window rate limiting over the shared counter store.
//!
//! Stage one of the admission pipeline: every inbound request is counted
//! before authentication or forwarding run. The counter key encodes the
//! window index, so window rollover needs no reset logic; the old key
//! simply ages out via TTL. Cross-worker correctness rests entirely on the
//! store's atomic increment.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{RateLimitConfig, StoreUnavailablePolicy};
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::store::{CounterStore, StoreError};

/// Rate-limit partition key. IP-derived for anonymous traffic, subject-based
/// once a verified identity is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(addr.ip().to_string())
    }

    pub fn from_subject(subject: &str) -> Self {
        Self(format!("sub:{subject}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Admission decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Requests left in the current window (0 when rejected).
    pub remaining: u64,
    /// Time until the window rolls over; present on rejection.
    pub retry_after: Option<Duration>,
}

/// Fixed-window counter built atop the shared counter store.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig, key_prefix: &str) -> Self {
        Self {
            store,
            config,
            key_prefix: key_prefix.to_string(),
        }
    }

    pub fn policy(&self) -> StoreUnavailablePolicy {
        self.config.on_store_unavailable
    }

    /// Count this request and decide admission. The only mutating path.
    pub async fn admit(
        &self,
        identity: &ClientIdentity,
        route_prefix: &str,
    ) -> Result<Decision, StoreError> {
        let now = unix_now();
        let key = self.window_key(identity, route_prefix, now);
        let ttl = Duration::from_secs(self.config.window_secs);

        let count = self.store.incr_with_ttl(&key, ttl).await?;
        if count > self.config.max_requests {
            Ok(Decision {
                allowed: false,
                remaining: 0,
                retry_after: Some(self.window_remaining(now)),
            })
        } else {
            Ok(Decision {
                allowed: true,
                remaining: self.config.max_requests - count,
                retry_after: None,
            })
        }
    }

    /// Read the current window's count without consuming admission budget.
    pub async fn current(
        &self,
        identity: &ClientIdentity,
        route_prefix: &str,
    ) -> Result<u64, StoreError> {
        let key = self.window_key(identity, route_prefix, unix_now());
        self.store.current(&key).await
    }

    /// Time remaining in the window that contains `now`.
    pub fn window_remaining(&self, now: u64) -> Duration {
        Duration::from_secs(self.config.window_secs - (now % self.config.window_secs))
    }

    fn window_key(&self, identity: &ClientIdentity, route_prefix: &str, now: u64) -> String {
        let window_index = now / self.config.window_secs;
        format!(
            "{}:{}:{}:{}",
            self.key_prefix,
            identity.as_str(),
            route_prefix,
            window_index
        )
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Middleware wrapper around [`RateLimiter::admit`].
///
/// Partitions by source address: this stage runs before the auth gate, so
/// no verified identity exists yet. Callers driving [`RateLimiter::admit`]
/// directly can key on a subject via [`ClientIdentity::from_subject`].
///
/// Applies the configured `on_store_unavailable` policy when the counter
/// store cannot be reached.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let identity = ClientIdentity::from_addr(&addr);
    let route_prefix = route_prefix_of(request.uri().path()).to_string();

    match limiter.admit(&identity, &route_prefix).await {
        Ok(decision) if decision.allowed => next.run(request).await,
        Ok(decision) => {
            tracing::warn!(
                client = %identity.as_str(),
                prefix = %route_prefix,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited();
            GatewayError::RateLimited {
                retry_after: decision.retry_after.unwrap_or_default(),
            }
            .into_response()
        }
        Err(error) => match limiter.policy() {
            StoreUnavailablePolicy::Admit => {
                tracing::warn!(error = %error, "Counter store unreachable; admitting uncounted");
                next.run(request).await
            }
            StoreUnavailablePolicy::Reject => {
                tracing::warn!(error = %error, "Counter store unreachable; rejecting");
                metrics::record_rate_limited();
                GatewayError::RateLimited {
                    retry_after: limiter.window_remaining(unix_now()),
                }
                .into_response()
            }
            StoreUnavailablePolicy::Error => {
                tracing::error!(error = %error, "Counter store unreachable");
                GatewayError::Internal.into_response()
            }
        },
    }
}

/// First path segment, used to scope counters per route family.
fn route_prefix_of(path: &str) -> &str {
    let trimmed = path.trim_start_matches('/');
    match trimmed.split('/').next() {
        Some("") | None => "/",
        Some(first) => first,
    }
}
