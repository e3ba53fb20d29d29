//! Admission and header security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (shared fixed-window counter, first pipeline stage)
//!     → [auth gate runs next]
//!     → headers.rs (strip hop-by-hop, inject diagnostics) at forward time
//! ```
//!
//! # Design Decisions
//! - Rate limiting runs before authentication so unauthenticated floods
//!   never reach the token verifier
//! - Counter state lives in the shared store; workers hold no local budget
//! - Store-outage behavior is a configured policy, not an accident

pub mod headers;
pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, ClientIdentity, Decision, RateLimiter};
