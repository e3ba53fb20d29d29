//! Token claims attached to authenticated requests.

use serde::{Deserialize, Serialize};

/// Role required for allow-list administration.
pub const ADMIN_ROLE: &str = "admin";

/// Claims carried by a verified bearer token.
///
/// Immutable once decoded; inserted into request extensions by the auth
/// gate and dropped when the request completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the authenticated principal.
    pub sub: String,

    /// Role granted to the principal.
    #[serde(default)]
    pub role: String,

    /// Issued-at, unix seconds.
    pub iat: i64,

    /// Expiry, unix seconds. Enforced by the verifier.
    pub exp: i64,
}

impl TokenClaims {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Request identity as decided by the auth gate. Present on every request
/// that passed the gate: `None` means the path was allow-listed and no
/// token was presented.
#[derive(Debug, Clone)]
pub struct Identity(pub Option<TokenClaims>);
