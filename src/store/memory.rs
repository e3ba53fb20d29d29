//! In-memory store implementation.
//!
//! Backs unit and integration tests, and single-node development where no
//! Redis is running. Counters honor TTLs so window expiry behaves like the
//! real store. An outage switch lets tests exercise the
//! `on_store_unavailable` policies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::store::{AllowListEntry, AllowListStore, CounterStore, StoreError};

#[derive(Debug)]
struct Counter {
    value: u64,
    expires_at: Instant,
}

/// DashMap-backed counter and allow-list store.
#[derive(Default)]
pub struct MemoryStore {
    counters: DashMap<String, Counter>,
    entries: DashMap<String, AllowListEntry>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage. While set, every operation returns
    /// [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.check_available()?;
        let now = Instant::now();
        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            value: 0,
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            entry.value = 0;
        }
        entry.value += 1;
        entry.expires_at = now + ttl;
        Ok(entry.value)
    }

    async fn current(&self, key: &str) -> Result<u64, StoreError> {
        self.check_available()?;
        Ok(self
            .counters
            .get(key)
            .filter(|c| c.expires_at > Instant::now())
            .map(|c| c.value)
            .unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[async_trait]
impl AllowListStore for MemoryStore {
    async fn find_by_path(&self, path: &str) -> Result<Option<AllowListEntry>, StoreError> {
        self.check_available()?;
        Ok(self.entries.get(path).map(|e| e.clone()))
    }

    async fn create(&self, entry: AllowListEntry) -> Result<AllowListEntry, StoreError> {
        self.check_available()?;
        match self.entries.entry(entry.path.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Conflict(entry.path)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry.clone());
                Ok(entry)
            }
        }
    }

    async fn list_all(&self) -> Result<Vec<AllowListEntry>, StoreError> {
        self.check_available()?;
        Ok(self.entries.iter().map(|e| e.clone()).collect())
    }
}
