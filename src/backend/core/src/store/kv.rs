//! Key-value store backends for job documents.
//!
//! The job store needs very little from its backing store: point reads and
//! writes plus a prefix scan that returns entries in insertion order. The
//! memory backend tracks a monotonic sequence per key; the Redis backend
//! keeps a companion sorted set scored by an atomic counter so scans come
//! back in the same order documents were first written.
//!
//! Overwriting an existing key does not change its insertion position.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ConveyorError, ErrorCode, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// KV Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for persistent key-value backends.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value, overwriting any existing entry.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Returns true when an entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Return all entries whose key starts with `prefix`, in insertion
    /// order ascending.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;

    /// Get the backend name.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Backend
// ═══════════════════════════════════════════════════════════════════════════════

struct SequencedValue {
    seq: u64,
    value: String,
}

/// In-process store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, SequencedValue>,
    next_seq: AtomicU64,
}

impl MemoryKvStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                // Keep the original insertion position
                occupied.get_mut().value = value.to_string();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SequencedValue {
                    seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut matches: Vec<(u64, String, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.seq, entry.key().clone(), entry.value.clone()))
            .collect();

        matches.sort_by_key(|(seq, _, _)| *seq);
        Ok(matches.into_iter().map(|(_, k, v)| (k, v)).collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Backend
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis-backed store for multi-process deployments.
///
/// Insertion order is tracked in a sorted set scored by an `INCR` counter,
/// since Redis keyspace scans are unordered.
pub struct RedisKvStore {
    client: redis::Client,
    index_key: String,
    seq_key: String,
}

impl RedisKvStore {
    /// Create a new Redis store backend.
    ///
    /// # Arguments
    /// * `client` - A connected Redis client
    /// * `namespace` - Prefix for the insertion-order bookkeeping keys
    ///   (e.g. `"conveyor"`)
    pub fn new(client: redis::Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            client,
            index_key: format!("{}:insertion_index", namespace),
            seq_key: format!("{}:insertion_seq", namespace),
        }
    }

    /// Obtain an async multiplexed connection from the Redis client.
    async fn get_conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                ConveyorError::with_internal(
                    ErrorCode::StoreConnectionFailed,
                    "Failed to get Redis connection for job store",
                    e.to_string(),
                )
            })
    }

    fn store_error(e: redis::RedisError, what: &'static str) -> ConveyorError {
        ConveyorError::with_internal(ErrorCode::StoreError, what, e.to_string())
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn().await?;
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(|e| Self::store_error(e, "Failed to read job document"))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.get_conn().await?;

        let seq: u64 = redis::cmd("INCR")
            .arg(&self.seq_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::store_error(e, "Failed to advance insertion counter"))?;

        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| Self::store_error(e, "Failed to write job document"))?;

        // NX keeps the original score on overwrite, preserving insertion order
        redis::cmd("ZADD")
            .arg(&self.index_key)
            .arg("NX")
            .arg(seq)
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| Self::store_error(e, "Failed to index job document"))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.get_conn().await?;

        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::store_error(e, "Failed to delete job document"))?;

        redis::cmd("ZREM")
            .arg(&self.index_key)
            .arg(key)
            .query_async::<_, i64>(&mut conn)
            .await
            .map_err(|e| Self::store_error(e, "Failed to unindex job document"))?;

        Ok(removed > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut conn = self.get_conn().await?;

        let keys: Vec<String> = redis::cmd("ZRANGE")
            .arg(&self.index_key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::store_error(e, "Failed to scan job index"))?;

        let matching: Vec<String> = keys
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        if matching.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("MGET");
        for key in &matching {
            cmd.arg(key);
        }
        let values: Vec<Option<String>> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::store_error(e, "Failed to read job documents"))?;

        Ok(matching
            .into_iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_set_get_delete() {
        let store = MemoryKvStore::new();

        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("1".to_string()));

        assert!(store.delete("a").await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(!store.delete("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_scan_returns_insertion_order() {
        let store = MemoryKvStore::new();

        store.set("jobs_b", "2").await.unwrap();
        store.set("jobs_a", "1").await.unwrap();
        store.set("jobs_c", "3").await.unwrap();
        store.set("other_x", "9").await.unwrap();

        let entries = store.scan_prefix("jobs_").await.unwrap();
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["jobs_b", "jobs_a", "jobs_c"]);
    }

    #[tokio::test]
    async fn test_memory_overwrite_keeps_insertion_position() {
        let store = MemoryKvStore::new();

        store.set("jobs_a", "1").await.unwrap();
        store.set("jobs_b", "2").await.unwrap();
        store.set("jobs_a", "1-updated").await.unwrap();

        let entries = store.scan_prefix("jobs_").await.unwrap();
        assert_eq!(entries[0], ("jobs_a".to_string(), "1-updated".to_string()));
        assert_eq!(entries[1].0, "jobs_b");
    }

    #[tokio::test]
    async fn test_memory_scan_empty_prefix_match() {
        let store = MemoryKvStore::new();
        store.set("x", "1").await.unwrap();

        let entries = store.scan_prefix("jobs_").await.unwrap();
        assert!(entries.is_empty());
    }
}
