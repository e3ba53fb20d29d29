//! Redis-backed shared state.
//!
//! Counters use `INCR` + `EXPIRE` inside a `MULTI` block so the increment
//! and the TTL land atomically; the allow-list is a hash keyed by path,
//! written with `HSETNX` so duplicate creates fail at the store instead of
//! racing in the gateway.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::store::{AllowListEntry, AllowListStore, CounterStore, StoreError};

/// Redis client shared by the rate limiter and the allow-list resolver.
///
/// `ConnectionManager` multiplexes one connection per process and
/// reconnects on failure; clones are cheap handles to the same connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    allow_list_key: String,
}

impl RedisStore {
    /// Connect to Redis. Fails fast if the URL is malformed or the initial
    /// connection cannot be established.
    pub async fn connect(url: &str, allow_list_key: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            allow_list_key: allow_list_key.to_string(),
        })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .expire(key, ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn current(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<u64> = conn.get(key).await?;
        Ok(value.unwrap_or(0))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AllowListStore for RedisStore {
    async fn find_by_path(&self, path: &str) -> Result<Option<AllowListEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(&self.allow_list_key, path).await?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    async fn create(&self, entry: AllowListEntry) -> Result<AllowListEntry, StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&entry)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let inserted: bool = conn
            .hset_nx(&self.allow_list_key, &entry.path, json)
            .await?;
        if inserted {
            Ok(entry)
        } else {
            Err(StoreError::Conflict(entry.path))
        }
    }

    async fn list_all(&self) -> Result<Vec<AllowListEntry>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.hvals(&self.allow_list_key).await?;
        raw.into_iter()
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .collect()
    }
}
