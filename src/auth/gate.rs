//! Authentication gate.
//!
//! Stage two of the admission pipeline. Order matters and is a contract:
//! the allow-list lookup runs *before* any token is demanded, because the
//! lookup is the mechanism that grants unauthenticated access. The
//! endpoints that mutate the allow-list are themselves authenticated, so
//! the bypass is one-way: anyone can benefit from a listed path, only
//! authenticated admins can list one.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::claims::{Identity, TokenClaims};
use crate::auth::verifier::{AuthError, TokenVerifier};
use crate::observability::metrics;
use crate::store::AllowListStore;

/// Outcome of the gate for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Path is allow-listed; no identity attached.
    Bypass,
    /// Token verified; claims become the request identity.
    Authenticated(TokenClaims),
}

/// The gate itself: allow-list resolver plus token verifier.
pub struct AuthGate {
    allow_list: Arc<dyn AllowListStore>,
    verifier: Arc<TokenVerifier>,
}

impl AuthGate {
    pub fn new(allow_list: Arc<dyn AllowListStore>, verifier: Arc<TokenVerifier>) -> Self {
        Self {
            allow_list,
            verifier,
        }
    }

    /// Decide whether a request may pass, and under which identity.
    pub async fn authenticate(
        &self,
        path: &str,
        authorization: Option<&str>,
    ) -> Result<AuthOutcome, AuthError> {
        let exempt = self
            .allow_list
            .find_by_path(path)
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        if exempt.is_some() {
            return Ok(AuthOutcome::Bypass);
        }

        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(AuthError::MissingToken)?;

        let claims = self.verifier.verify(token)?;
        Ok(AuthOutcome::Authenticated(claims))
    }
}

/// Middleware wrapper around [`AuthGate::authenticate`].
///
/// On success the claims (if any) are attached to request extensions for
/// downstream role checks and identity headers.
pub async fn auth_gate_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned);

    match gate.authenticate(&path, authorization.as_deref()).await {
        Ok(AuthOutcome::Bypass) => {
            tracing::debug!(path = %path, "Auth bypass via allow-list");
            request.extensions_mut().insert(Identity(None));
            next.run(request).await
        }
        Ok(AuthOutcome::Authenticated(claims)) => {
            request.extensions_mut().insert(Identity(Some(claims.clone())));
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(error) => {
            tracing::debug!(path = %path, error = %error, "Request rejected at auth gate");
            metrics::record_auth_rejected(&error);
            crate::http::response::GatewayError::from(error).into_response()
        }
    }
}
