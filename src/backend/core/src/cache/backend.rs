//! Cache backend implementations.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{ConveyorError, ErrorCode, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Cache Backend Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for TTL cache backends.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get a value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value with a TTL, overwriting any existing entry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Set a value with a TTL only if the key is absent (or expired).
    ///
    /// Returns true when the entry was written. This is the atomic
    /// check-and-set used by the process lock where the backend supports
    /// one; the overall single-worker guarantee stays best-effort because
    /// the lock can still expire mid-run.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete a value. Returns true when an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Check whether a live (non-expired) entry exists.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Get the backend name.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryEntry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process TTL cache with lazy expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryCache {
    /// Create a new in-memory cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        // The read guard must be dropped before removing an expired entry
        let live = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        match live {
            Some(value) => Ok(Some(value)),
            None => {
                self.entries.remove(key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), MemoryEntry::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(MemoryEntry::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(MemoryEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis-backed TTL cache.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    /// Create a new Redis cache backend from a connected client.
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Obtain an async multiplexed connection from the Redis client.
    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                ConveyorError::with_internal(
                    ErrorCode::CacheConnectionFailed,
                    "Failed to get Redis connection for cache",
                    e.to_string(),
                )
            })
    }

    fn cache_error(e: redis::RedisError, what: &'static str) -> ConveyorError {
        ConveyorError::with_internal(ErrorCode::CacheError, what, e.to_string())
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| Self::cache_error(e, "Failed to read cache entry"))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.get_conn().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| Self::cache_error(e, "Failed to write cache entry"))?;

        debug!(key = key, ttl_ms = ttl.as_millis() as u64, "Cache entry set");
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        // SET NX returns OK on success, nil when the key already exists
        let written: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_error(e, "Failed to write cache entry"))?;

        Ok(written.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_error(e, "Failed to delete cache entry"))?;

        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;
        let found: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::cache_error(e, "Failed to check cache entry"))?;

        Ok(found > 0)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
