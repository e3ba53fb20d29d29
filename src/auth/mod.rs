//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (already rate-limited):
//!     → gate.rs (allow-list lookup; listed path short-circuits)
//!     → gate.rs (extract bearer token from Authorization)
//!     → verifier.rs (HS256 signature + expiry against shared secret)
//!     → claims attached to request extensions
//! ```
//!
//! # Design Decisions
//! - Allow-list check precedes the token demand; the list is the
//!   unauthenticated-access mechanism, not a hole
//! - Expired and tampered tokens both map to 401, never 500; only
//!   infrastructure failures are 500s
//! - Verification is pure signature + expiry; no store round-trip per token

pub mod claims;
pub mod gate;
pub mod verifier;

pub use claims::{Identity, TokenClaims, ADMIN_ROLE};
pub use gate::{auth_gate_middleware, AuthGate, AuthOutcome};
pub use verifier::{AuthError, TokenVerifier};
