//! Process lock: TTL-bounded mutual exclusion for the worker loop.
//!
//! The lock is a single cache entry `"{handler}_process_lock"` holding an
//! opaque token. Presence means a worker is active; absence means free.
//! Ownership is not tracked beyond presence, so any worker may clear it.
//!
//! Acquisition uses the backend's atomic set-if-absent where available, but
//! the single-worker guarantee remains best-effort: the TTL exists so a
//! crashed worker cannot block the queue forever, which also means a
//! pathologically slow worker can outlive its own lock. The TTL must
//! therefore exceed the processing time budget.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

use super::hooks::Hooks;
use crate::cache::CacheBackend;
use crate::error::Result;

/// TTL-bounded mutual exclusion over the cache.
#[derive(Clone)]
pub struct ProcessLock {
    cache: Arc<dyn CacheBackend>,
    key: String,
    ttl: Duration,
    hooks: Arc<Hooks>,
}

impl ProcessLock {
    /// Create a lock for one handler identifier.
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        handler: &str,
        ttl: Duration,
        hooks: Arc<Hooks>,
    ) -> Self {
        Self {
            cache,
            key: format!("{}_process_lock", handler),
            ttl,
            hooks,
        }
    }

    /// The cache key holding the lock entry.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Try to acquire the lock, recording the start time of the run.
    ///
    /// Returns `None` when another worker already holds it.
    pub async fn acquire(&self) -> Result<Option<Instant>> {
        let start_time = Instant::now();
        let ttl = self.hooks.apply_lock_ttl(self.ttl);
        let token = Uuid::new_v4().to_string();

        if self.cache.set_if_absent(&self.key, &token, ttl).await? {
            debug!(key = %self.key, ttl_secs = ttl.as_secs(), "Process lock acquired");
            Ok(Some(start_time))
        } else {
            debug!(key = %self.key, "Process lock already held");
            Ok(None)
        }
    }

    /// Release the lock.
    pub async fn release(&self) -> Result<bool> {
        let released = self.cache.delete(&self.key).await?;
        if released {
            debug!(key = %self.key, "Process lock released");
        }
        Ok(released)
    }

    /// Whether a worker currently holds the lock.
    ///
    /// Expired entries read as absent.
    pub async fn is_held(&self) -> Result<bool> {
        self.cache.exists(&self.key).await
    }
}
