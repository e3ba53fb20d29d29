//! Error taxonomy and client-facing response mapping.
//!
//! # Responsibilities
//! - One error type per pipeline rejection class
//! - Translate each class into exactly one HTTP status
//! - Structured JSON bodies; internal detail is logged, never leaked
//!
//! # Design Decisions
//! - Errors are translated at the stage boundary where they occur; no
//!   pipeline error crosses into a later stage
//! - 429 responses carry Retry-After both as a header and a body field

use std::time::Duration;

use axum::{
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Client-visible rejection classes for the admission pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Rate limit exceeded for the current window.
    #[error("Too many requests")]
    RateLimited { retry_after: Duration },

    /// No bearer token on a protected path.
    #[error("No token provided")]
    MissingToken,

    /// Malformed, tampered, or expired token.
    #[error("Invalid token")]
    InvalidToken,

    /// Authenticated but lacking the required role.
    #[error("Admin access required")]
    Forbidden,

    /// Uniqueness violation on an administrative create.
    #[error("Entry already exists for path '{0}'")]
    Conflict(String),

    /// Upstream did not respond within the configured deadline.
    #[error("Upstream timed out")]
    UpstreamTimeout,

    /// Upstream connection refused, DNS failure, or reset.
    #[error("Upstream request failed")]
    UpstreamUnreachable,

    /// Unexpected store/verifier failure. Detail stays server-side.
    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::MissingToken | GatewayError::InvalidToken => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamUnreachable => StatusCode::BAD_GATEWAY,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            GatewayError::RateLimited { retry_after } => json!({
                "message": self.to_string(),
                "retryAfter": retry_after.as_secs(),
            }),
            other => json!({ "message": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if let GatewayError::RateLimited { retry_after } = self {
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<AuthError> for GatewayError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingToken => GatewayError::MissingToken,
            AuthError::InvalidToken | AuthError::Expired => GatewayError::InvalidToken,
            AuthError::Forbidden => GatewayError::Forbidden,
            AuthError::Internal(detail) => {
                tracing::error!(detail = %detail, "Auth infrastructure failure");
                GatewayError::Internal
            }
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(path) => GatewayError::Conflict(path),
            StoreError::Unavailable(detail) | StoreError::Corrupt(detail) => {
                tracing::error!(detail = %detail, "Store failure");
                GatewayError::Internal
            }
        }
    }
}
