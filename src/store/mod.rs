//! Shared state store subsystem.
//!
//! # Data Flow
//! ```text
//! Rate limiter ──▶ CounterStore::incr_with_ttl (atomic, cross-worker)
//! Auth gate    ──▶ AllowListStore::find_by_path (read-only, per request)
//! Admin API    ──▶ AllowListStore::{create, list_all}
//! ```
//!
//! # Design Decisions
//! - Workers share no mutable memory for admission state; every
//!   cross-worker fact lives behind these traits
//! - The store's own atomicity (INCR, HSETNX) is the sole correctness
//!   mechanism; no in-process locking is layered on top
//! - `memory.rs` backs tests and single-node development; `redis.rs` is
//!   the production implementation

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or answered with an error.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Uniqueness violation on create.
    #[error("entry already exists for path '{0}'")]
    Conflict(String),

    /// A stored value failed to decode.
    #[error("corrupt entry: {0}")]
    Corrupt(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// A path exempt from authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListEntry {
    /// Request path this entry exempts (exact match).
    pub path: String,

    /// Operator-facing note on why the exemption exists.
    #[serde(default)]
    pub description: String,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl AllowListEntry {
    pub fn new(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// Atomic counters with expiry, shared across all workers.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key`, setting its TTL, and return the
    /// post-increment value.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Read the current value of `key` without mutating it. Missing keys
    /// read as zero.
    async fn current(&self, key: &str) -> Result<u64, StoreError>;

    /// Liveness probe, used during startup checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Persisted set of authentication-exempt paths.
#[async_trait]
pub trait AllowListStore: Send + Sync {
    /// Exact-match lookup by request path.
    async fn find_by_path(&self, path: &str) -> Result<Option<AllowListEntry>, StoreError>;

    /// Insert a new entry. Duplicate paths yield [`StoreError::Conflict`];
    /// existing entries are never overwritten.
    async fn create(&self, entry: AllowListEntry) -> Result<AllowListEntry, StoreError>;

    /// All entries, in no particular order.
    async fn list_all(&self) -> Result<Vec<AllowListEntry>, StoreError>;
}
