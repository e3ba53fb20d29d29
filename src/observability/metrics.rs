//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): forwarded requests by method, status
//! - `gateway_request_duration_seconds` (histogram): forwarding latency
//! - `gateway_rate_limited_total` (counter): admissions rejected by the limiter
//! - `gateway_auth_rejected_total` (counter): auth gate rejections by reason
//! - `gateway_upstream_failures_total` (counter): upstream errors by kind
//!
//! # Design Decisions
//! - Low-overhead updates (atomic operations behind the metrics facade)
//! - The exporter runs once per process, not per worker

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::auth::AuthError;

/// Install the Prometheus exporter on its own address. Call once, from the
/// supervisor process, before workers start.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(error) => tracing::error!(error = %error, "Failed to install metrics exporter"),
    }
}

/// Record one forwarded (or rejected-at-forwarding) request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// Record an admission rejected by the rate limiter.
pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

/// Record a rejection at the auth gate.
pub fn record_auth_rejected(error: &AuthError) {
    let reason = match error {
        AuthError::MissingToken => "missing_token",
        AuthError::InvalidToken => "invalid_token",
        AuthError::Expired => "expired",
        AuthError::Forbidden => "forbidden",
        AuthError::Internal(_) => "internal",
    };
    counter!("gateway_auth_rejected_total", "reason" => reason).increment(1);
}

/// Record an upstream forwarding failure.
pub fn record_upstream_failure(kind: &'static str) {
    counter!("gateway_upstream_failures_total", "kind" => kind).increment(1);
}
