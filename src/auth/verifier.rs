//! Bearer token verification and issuance.
//!
//! Tokens are HS256-signed against a shared secret and verified without any
//! database round-trip: signature plus expiry only. The signing half exists
//! for the external login service and for tests; the gateway itself only
//! verifies.

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::TokenClaims;

/// Error type for authentication decisions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No bearer token on a request that required one.
    #[error("No token provided")]
    MissingToken,

    /// Malformed token or signature mismatch.
    #[error("Invalid token")]
    InvalidToken,

    /// Structurally valid token past its expiry.
    #[error("Token expired")]
    Expired,

    /// Authenticated principal lacks the required role.
    #[error("Admin access required")]
    Forbidden,

    /// Verifier or allow-list infrastructure failure.
    #[error("Internal server error")]
    Internal(String),
}

/// HS256 verifier/signer over the shared secret.
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    token_ttl_secs: u64,
}

impl TokenVerifier {
    pub fn new(secret: &str, token_ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Reject at the exact expiry instant rather than the default 60s
        // grace; admission decisions should not drift between workers.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            token_ttl_secs,
        }
    }

    /// Verify signature and expiry, producing the decoded claims.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidKeyFormat
                | jsonwebtoken::errors::ErrorKind::Crypto(_) => {
                    AuthError::Internal(e.to_string())
                }
                _ => AuthError::InvalidToken,
            })
    }

    /// Issue a signed token for `subject` with `role`, expiring after the
    /// configured TTL.
    pub fn sign(&self, subject: &str, role: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: subject.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::seconds(self.token_ttl_secs as i64)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Sign claims verbatim. Used by tests to mint expired or odd tokens.
    pub fn sign_claims(&self, claims: &TokenClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}
