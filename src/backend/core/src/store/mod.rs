//! Job document store.
//!
//! CRUD plus filtered listing over job documents in a key-value backend.
//! Documents are serialized JSON under keys shaped
//! `"{handler}_job_{job-id}"`; the queue is simply the set of documents
//! whose status is non-terminal, discovered by a prefix scan in insertion
//! order.
//!
//! Status filtering operates on the deserialized record, not on substring
//! matches over the serialized blob; the ordering and filtering semantics
//! (insertion order ascending for single-job fetch, configurable
//! order/field for listing) are part of the store's contract.

pub mod kv;

pub use kv::{KvStore, MemoryKvStore, RedisKvStore};

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::instrument;

use crate::error::{ConveyorError, Result};
use crate::jobs::events::{EventBus, JobEventKind};
use crate::jobs::hooks::Hooks;
use crate::jobs::job::{Job, JobId, JobStatus};
use crate::telemetry::metrics;

// ═══════════════════════════════════════════════════════════════════════════════
// List Options
// ═══════════════════════════════════════════════════════════════════════════════

/// Sort direction for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    Asc,
    #[default]
    Desc,
}

/// Sort field for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrderBy {
    /// Order documents were first written (the default)
    #[default]
    Insertion,
    /// `created_at`
    Created,
    /// `updated_at`, falling back to `created_at` for never-updated jobs
    Updated,
    /// Job id, lexicographic
    Id,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Store for one handler's job documents.
#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KvStore>,
    handler: String,
    created_by: String,
    hooks: Arc<Hooks>,
    events: Arc<EventBus>,
}

impl JobStore {
    /// Create a store over the given backend for one handler identifier.
    pub fn new(
        kv: Arc<dyn KvStore>,
        handler: impl Into<String>,
        created_by: impl Into<String>,
        hooks: Arc<Hooks>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            kv,
            handler: handler.into(),
            created_by: created_by.into(),
            hooks,
            events,
        }
    }

    /// The handler identifier this store is namespaced under.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// The observer bus events are fired on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    fn job_key(&self, id: JobId) -> String {
        format!("{}_job_{}", self.handler, id)
    }

    fn key_prefix(&self) -> String {
        format!("{}_job_", self.handler)
    }

    async fn persist(&self, job: &Job) -> Result<()> {
        let serialized = serde_json::to_string(job)?;
        self.kv.set(&self.job_key(job.id), &serialized).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a job from caller-supplied attributes.
    ///
    /// Defaults (`created_at`, `created_by`, `status`, `progress`) are
    /// merged in without overwriting caller-provided values; the `id` is
    /// always freshly generated and cannot be supplied or overridden, not
    /// even by the new-job attributes hook.
    ///
    /// # Errors
    ///
    /// Rejects empty attribute maps with a validation error.
    #[instrument(skip_all, fields(handler = %self.handler))]
    pub async fn create(&self, attrs: Map<String, Value>) -> Result<Job> {
        if attrs.is_empty() {
            return Err(ConveyorError::validation("Job attributes cannot be empty"));
        }

        let id = JobId::new();
        let id_value = serde_json::to_value(id)?;

        let mut doc = Map::new();
        doc.insert("id".to_string(), id_value.clone());
        doc.insert("status".to_string(), serde_json::json!("queued"));
        doc.insert("created_at".to_string(), serde_json::to_value(Utc::now())?);
        doc.insert(
            "created_by".to_string(),
            Value::String(self.created_by.clone()),
        );
        doc.insert("progress".to_string(), serde_json::json!(0));

        for (key, value) in attrs {
            if key != "id" {
                doc.insert(key, value);
            }
        }

        let mut doc = self.hooks.apply_new_job_attrs(doc);
        doc.insert("id".to_string(), id_value);

        let job: Job = serde_json::from_value(Value::Object(doc))?;
        self.persist(&job).await?;
        self.events.emit(&self.handler, JobEventKind::Created, &job);
        Ok(job)
    }

    /// Get a job.
    ///
    /// With an id: direct lookup. Without: the first job in insertion order
    /// whose status is `Queued` or `Processing` — i.e. the next job the
    /// worker should pick up. Returns `None` when nothing matches.
    #[instrument(skip_all, fields(handler = %self.handler))]
    pub async fn get(&self, id: Option<JobId>) -> Result<Option<Job>> {
        if let Some(id) = id {
            let Some(serialized) = self.kv.get(&self.job_key(id)).await? else {
                return Ok(None);
            };
            let job: Job = serde_json::from_str(&serialized)?;
            self.events.emit(&self.handler, JobEventKind::Fetched, &job);
            return Ok(Some(job));
        }

        for (_, serialized) in self.kv.scan_prefix(&self.key_prefix()).await? {
            let job: Job = serde_json::from_str(&serialized)?;
            if !job.is_terminal() {
                self.events.emit(&self.handler, JobEventKind::Fetched, &job);
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// List jobs, optionally filtered to a set of statuses.
    ///
    /// Returns `None` when nothing matches.
    #[instrument(skip_all, fields(handler = %self.handler))]
    pub async fn list(
        &self,
        statuses: Option<&[JobStatus]>,
        order: ListOrder,
        orderby: ListOrderBy,
    ) -> Result<Option<Vec<Job>>> {
        let mut jobs = Vec::new();
        for (_, serialized) in self.kv.scan_prefix(&self.key_prefix()).await? {
            let job: Job = serde_json::from_str(&serialized)?;
            let matches = match statuses {
                Some(wanted) if !wanted.is_empty() => wanted.contains(&job.status),
                _ => true,
            };
            if matches {
                jobs.push(job);
            }
        }

        if jobs.is_empty() {
            return Ok(None);
        }

        match orderby {
            // Scan order is already insertion order ascending
            ListOrderBy::Insertion => {}
            ListOrderBy::Created => jobs.sort_by_key(|job| job.created_at),
            ListOrderBy::Updated => {
                jobs.sort_by_key(|job| job.updated_at.unwrap_or(job.created_at))
            }
            ListOrderBy::Id => jobs.sort_by_key(|job| job.id.0),
        }
        if order == ListOrder::Desc {
            jobs.reverse();
        }

        Ok(Some(jobs))
    }

    /// Persist a mutated job, stamping `updated_at`.
    ///
    /// Returns `Ok(false)` when the job no longer resolves to a stored
    /// document; callers must check.
    #[instrument(skip_all, fields(handler = %self.handler, job_id = %job.id))]
    pub async fn update(&self, job: &mut Job) -> Result<bool> {
        if self.kv.get(&self.job_key(job.id)).await?.is_none() {
            return Ok(false);
        }

        job.touch();
        self.persist(job).await?;
        self.events.emit(&self.handler, JobEventKind::Updated, job);
        Ok(true)
    }

    /// Transition a job to `Completed` and persist it.
    ///
    /// A no-op returning `Ok(false)` when the job is already terminal or no
    /// longer resolves.
    pub async fn complete(&self, job: &mut Job) -> Result<bool> {
        if !job.mark_completed() {
            return Ok(false);
        }
        if !self.update(job).await? {
            return Ok(false);
        }
        self.events
            .emit(&self.handler, JobEventKind::Completed, job);
        Ok(true)
    }

    /// Transition a job to `Failed` with a reason and persist it.
    ///
    /// A terminal, manual-intent operation: the worker never calls this on
    /// ordinary queue exhaustion. A no-op returning `Ok(false)` when the
    /// job is already terminal or no longer resolves.
    pub async fn fail(&self, job: &mut Job, reason: impl Into<String>) -> Result<bool> {
        if !job.mark_failed(reason) {
            return Ok(false);
        }
        if !self.update(job).await? {
            return Ok(false);
        }
        self.events.emit(&self.handler, JobEventKind::Failed, job);
        Ok(true)
    }

    /// Remove a job document.
    pub async fn delete(&self, job: &Job) -> Result<bool> {
        let removed = self.kv.delete(&self.job_key(job.id)).await?;
        if removed {
            self.events.emit(&self.handler, JobEventKind::Deleted, job);
        }
        Ok(removed)
    }

    /// Number of non-terminal jobs.
    pub async fn queue_len(&self) -> Result<u64> {
        let mut depth = 0u64;
        for (_, serialized) in self.kv.scan_prefix(&self.key_prefix()).await? {
            let job: Job = serde_json::from_str(&serialized)?;
            if !job.is_terminal() {
                depth += 1;
            }
        }
        metrics::set_queue_depth(&self.handler, depth);
        Ok(depth)
    }

    /// Whether the queue holds no non-terminal jobs.
    pub async fn queue_is_empty(&self) -> Result<bool> {
        Ok(self.queue_len().await? == 0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_store() -> JobStore {
        JobStore::new(
            Arc::new(MemoryKvStore::new()),
            "reports",
            "tests",
            Arc::new(Hooks::new()),
            Arc::new(EventBus::new()),
        )
    }

    fn attrs(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_rejects_empty_attrs() {
        let store = test_store();
        let err = store.create(Map::new()).await.unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_create_merges_defaults_without_overwriting() {
        let store = test_store();
        let job = store
            .create(attrs(&[
                ("data", json!(["a"])),
                ("created_by", json!("operator")),
                ("tenant", json!("acme")),
            ]))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        // Caller-provided created_by wins over the store default
        assert_eq!(job.created_by, "operator");
        assert_eq!(job.extra.get("tenant"), Some(&json!("acme")));
    }

    #[tokio::test]
    async fn test_create_ignores_caller_supplied_id() {
        let store = test_store();
        let job = store
            .create(attrs(&[
                ("id", json!("11111111-1111-1111-1111-111111111111")),
                ("data", json!([])),
            ]))
            .await
            .unwrap();

        assert_ne!(
            job.id.to_string(),
            "11111111-1111-1111-1111-111111111111"
        );
    }

    #[tokio::test]
    async fn test_get_by_id_and_queue_scan_order() {
        let store = test_store();
        let first = store.create(attrs(&[("data", json!([1]))])).await.unwrap();
        let second = store.create(attrs(&[("data", json!([2]))])).await.unwrap();

        let fetched = store.get(Some(second.id)).await.unwrap().unwrap();
        assert_eq!(fetched.id, second.id);

        // Queue scan returns the oldest non-terminal job
        let next = store.get(None).await.unwrap().unwrap();
        assert_eq!(next.id, first.id);
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_excluded_from_queue_scan() {
        let store = test_store();
        let mut first = store.create(attrs(&[("data", json!([]))])).await.unwrap();
        let second = store.create(attrs(&[("data", json!([1]))])).await.unwrap();

        assert!(store.fail(&mut first, "network timeout").await.unwrap());

        let next = store.get(None).await.unwrap().unwrap();
        assert_eq!(next.id, second.id);

        assert_eq!(store.queue_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = test_store();
        let mut a = store.create(attrs(&[("data", json!([1]))])).await.unwrap();
        let b = store.create(attrs(&[("data", json!([2]))])).await.unwrap();
        store.fail(&mut a, "boom").await.unwrap();

        // Default: everything, insertion order descending
        let all = store
            .list(None, ListOrder::default(), ListOrderBy::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id);

        let failed = store
            .list(
                Some(&[JobStatus::Failed]),
                ListOrder::Asc,
                ListOrderBy::Insertion,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, a.id);

        // No match is None, not an empty vec
        let completed = store
            .list(
                Some(&[JobStatus::Completed]),
                ListOrder::Desc,
                ListOrderBy::Insertion,
            )
            .await
            .unwrap();
        assert!(completed.is_none());
    }

    #[tokio::test]
    async fn test_update_stamps_updated_at() {
        let store = test_store();
        let mut job = store.create(attrs(&[("data", json!([1]))])).await.unwrap();
        assert!(job.updated_at.is_none());

        assert!(store.update(&mut job).await.unwrap());
        assert!(job.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_on_unresolvable_job_is_falsy() {
        let store = test_store();
        let mut job = store.create(attrs(&[("data", json!([1]))])).await.unwrap();
        assert!(store.delete(&job).await.unwrap());

        assert!(!store.update(&mut job).await.unwrap());
        assert!(!store.fail(&mut job, "late").await.unwrap());
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let store = test_store();
        let mut job = store.create(attrs(&[("data", json!([]))])).await.unwrap();
        job.mark_processing();
        store.update(&mut job).await.unwrap();

        assert!(store.complete(&mut job).await.unwrap());
        let stamp = job.completed_at;

        assert!(!store.complete(&mut job).await.unwrap());
        assert_eq!(job.completed_at, stamp);
    }

    #[tokio::test]
    async fn test_fail_records_reason_and_timestamp() {
        let store = test_store();
        let mut job = store.create(attrs(&[("data", json!([1]))])).await.unwrap();

        assert!(store.fail(&mut job, "network timeout").await.unwrap());
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("network timeout"));
        assert!(job.failed_at.is_some());

        let stored = store.get(Some(job.id)).await.unwrap().unwrap();
        assert_eq!(stored.failure_reason.as_deref(), Some("network timeout"));
    }

    #[tokio::test]
    async fn test_events_fire_for_lifecycle() {
        let events = Arc::new(EventBus::new());
        let created = Arc::new(AtomicUsize::new(0));
        let fetched = Arc::new(AtomicUsize::new(0));

        {
            let created = created.clone();
            let fetched = fetched.clone();
            events.subscribe(move |event| match event.kind {
                JobEventKind::Created => {
                    created.fetch_add(1, Ordering::SeqCst);
                }
                JobEventKind::Fetched => {
                    fetched.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            });
        }

        let store = JobStore::new(
            Arc::new(MemoryKvStore::new()),
            "reports",
            "tests",
            Arc::new(Hooks::new()),
            events,
        );

        let job = store.create(attrs(&[("data", json!([1]))])).await.unwrap();
        store.get(Some(job.id)).await.unwrap();
        store.get(None).await.unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        // Fetched fires on direct lookups and queue scans alike
        assert_eq!(fetched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_new_job_attrs_hook_applies() {
        let hooks = Hooks::new().with_new_job_attrs(|mut attrs| {
            attrs.insert("region".to_string(), json!("eu-1"));
            attrs
        });
        let store = JobStore::new(
            Arc::new(MemoryKvStore::new()),
            "reports",
            "tests",
            Arc::new(hooks),
            Arc::new(EventBus::new()),
        );

        let job = store.create(attrs(&[("data", json!([]))])).await.unwrap();
        assert_eq!(job.extra.get("region"), Some(&json!("eu-1")));
    }
}
