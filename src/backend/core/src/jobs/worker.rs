//! The processing loop: chunked, resumable iteration over job payloads.
//!
//! One [`Worker::run`] call is one invocation. It acquires the process
//! lock, works through queued jobs item by item — persisting after every
//! item so progress is never lost, only paused — and stops as soon as the
//! budget guard trips or the queue drains. Whether another invocation is
//! needed is the dispatcher's concern; the worker just reports it.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::budget::BudgetGuard;
use super::hooks::Hooks;
use super::job::{Job, JobStatus};
use super::lock::ProcessLock;
use super::processor::{ItemContext, ItemProcessor};
use crate::config::WorkerSettings;
use crate::error::{ConveyorError, Result};
use crate::store::JobStore;
use crate::telemetry::metrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Run Report
// ═══════════════════════════════════════════════════════════════════════════════

/// What a single invocation accomplished.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct RunReport {
    /// Jobs driven to completion during this invocation
    pub jobs_completed: u64,
    /// Payload items processed during this invocation
    pub items_processed: u64,
    /// Whether the budget guard halted the pass
    pub budget_exhausted: bool,
    /// Whether the queue was empty when the invocation ended
    pub queue_drained: bool,
}

/// Outcome of asking the worker to run.
#[derive(Debug)]
pub enum RunOutcome {
    /// The invocation ran; see the report
    Ran(RunReport),
    /// Another worker won the lock race; nothing was touched
    LockBusy,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Worker
// ═══════════════════════════════════════════════════════════════════════════════

/// The per-invocation processing loop, generic over an [`ItemProcessor`].
pub struct Worker {
    store: JobStore,
    lock: ProcessLock,
    processor: Arc<dyn ItemProcessor>,
    hooks: Arc<Hooks>,
    settings: WorkerSettings,
}

impl Worker {
    /// Create a worker.
    pub fn new(
        store: JobStore,
        lock: ProcessLock,
        processor: Arc<dyn ItemProcessor>,
        hooks: Arc<Hooks>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            store,
            lock,
            processor,
            hooks,
            settings,
        }
    }

    /// Run one invocation.
    ///
    /// # Errors
    ///
    /// A fatal fault while a job is being processed (missing/malformed
    /// payload, item handler error, store failure) first trips the failure
    /// trap — the in-flight job is marked failed with the fault text and
    /// the lock is released — and is then surfaced to the caller.
    #[instrument(skip_all, fields(handler = %self.store.handler(), processor = self.processor.name()))]
    pub async fn run(&self) -> Result<RunOutcome> {
        let Some(start_time) = self.lock.acquire().await? else {
            return Ok(RunOutcome::LockBusy);
        };

        let guard = BudgetGuard::new(start_time, self.settings.time_limit, self.hooks.clone());
        let mut report = RunReport::default();

        loop {
            let Some(mut job) = self.store.get(None).await? else {
                break;
            };

            if let Err(error) = self.process_job(&mut job, &guard, &mut report).await {
                self.trap(&mut job, &error).await;
                return Err(error);
            }

            if guard.exhausted() {
                report.budget_exhausted = true;
                break;
            }
        }

        self.lock.release().await?;
        report.queue_drained = self.store.queue_is_empty().await?;

        let duration = start_time.elapsed().as_secs_f64();
        metrics::record_invocation(self.store.handler(), report.items_processed, duration);
        info!(
            jobs_completed = report.jobs_completed,
            items_processed = report.items_processed,
            budget_exhausted = report.budget_exhausted,
            queue_drained = report.queue_drained,
            "Invocation finished"
        );

        Ok(RunOutcome::Ran(report))
    }

    /// Work through one job until it completes or the budget trips.
    async fn process_job(
        &self,
        job: &mut Job,
        guard: &BudgetGuard,
        report: &mut RunReport,
    ) -> Result<()> {
        if job.status != JobStatus::Processing {
            job.mark_processing();
            self.store.update(job).await?;
        }

        let payload_key = &self.settings.payload_key;
        // A missing or malformed payload is fatal for this invocation
        let total = job.payload_len(payload_key)?;

        while job.progress < total {
            let index = job.progress;
            let item = job.payload(payload_key)?[index as usize].clone();

            {
                let ctx = ItemContext {
                    handler: self.store.handler(),
                    job,
                    index,
                };
                self.processor.process(&item, &ctx).await.map_err(|e| {
                    ConveyorError::item_failed(self.processor.name(), index, e.message())
                })?;
            }

            job.advance_progress();
            self.store.update(job).await?;
            report.items_processed += 1;

            if guard.exhausted() {
                break;
            }
        }

        // An empty payload completes on first pickup: progress 0 >= length 0
        if job.progress >= total && self.store.complete(job).await? {
            report.jobs_completed += 1;
        }
        Ok(())
    }

    /// Failure trap for abnormal termination mid-job.
    ///
    /// Marks the bound job failed with the fault text and releases the
    /// lock, so a stuck lock does not block future invocations.
    async fn trap(&self, job: &mut Job, error: &ConveyorError) {
        warn!(
            job_id = %job.id,
            error = %error,
            "Fatal fault while processing; failing the in-flight job"
        );

        if let Err(fail_error) = self.store.fail(job, error.user_message()).await {
            warn!(job_id = %job.id, error = %fail_error, "Could not mark job failed");
        }
        if let Err(release_error) = self.lock.release().await {
            warn!(error = %release_error, "Could not release process lock");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::jobs::events::EventBus;
    use crate::jobs::processor::{ItemError, ItemResult};
    use crate::store::MemoryKvStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Records every item it sees; optionally errors on a chosen index.
    struct RecordingProcessor {
        seen: Mutex<Vec<Value>>,
        fail_at: Option<u64>,
    }

    impl RecordingProcessor {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_at: None,
            }
        }

        fn failing_at(index: u64) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                fail_at: Some(index),
            }
        }
    }

    #[async_trait]
    impl ItemProcessor for RecordingProcessor {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn process(&self, item: &Value, ctx: &ItemContext<'_>) -> ItemResult {
            if self.fail_at == Some(ctx.index) {
                return Err(ItemError::new("simulated handler failure"));
            }
            self.seen.lock().push(item.clone());
            Ok(())
        }
    }

    struct Fixture {
        store: JobStore,
        lock: ProcessLock,
        processor: Arc<RecordingProcessor>,
    }

    fn fixture_with(
        processor: RecordingProcessor,
        hooks: Hooks,
        settings: WorkerSettings,
    ) -> (Fixture, Worker) {
        let hooks = Arc::new(hooks);
        let store = JobStore::new(
            Arc::new(MemoryKvStore::new()),
            "reports",
            "tests",
            hooks.clone(),
            Arc::new(EventBus::new()),
        );
        let lock = ProcessLock::new(
            Arc::new(MemoryCache::new()),
            "reports",
            settings.lock_ttl,
            hooks.clone(),
        );
        let processor = Arc::new(processor);
        let worker = Worker::new(
            store.clone(),
            lock.clone(),
            processor.clone(),
            hooks,
            settings,
        );
        (
            Fixture {
                store,
                lock,
                processor,
            },
            worker,
        )
    }

    fn unlimited() -> WorkerSettings {
        WorkerSettings {
            time_limit: Duration::from_secs(3600),
            ..WorkerSettings::default()
        }
    }

    /// Budget that lets exactly one item through per invocation: the zero
    /// time limit trips on the first boundary check after an item.
    fn one_item_budget() -> WorkerSettings {
        WorkerSettings {
            time_limit: Duration::from_secs(0),
            ..WorkerSettings::default()
        }
    }

    fn attrs(payload: Value) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("data".to_string(), payload);
        map
    }

    #[tokio::test]
    async fn test_full_run_completes_job_in_order() {
        let (fx, worker) = fixture_with(RecordingProcessor::new(), Hooks::new(), unlimited());
        let job = fx.store.create(attrs(json!(["a", "b", "c"]))).await.unwrap();

        let outcome = worker.run().await.unwrap();
        let RunOutcome::Ran(report) = outcome else {
            panic!("expected a run");
        };

        assert_eq!(report.jobs_completed, 1);
        assert_eq!(report.items_processed, 3);
        assert!(report.queue_drained);

        let done = fx.store.get(Some(job.id)).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 3);
        assert!(done.completed_at.is_some());

        assert_eq!(*fx.processor.seen.lock(), vec![json!("a"), json!("b"), json!("c")]);
        assert!(fx.store.queue_is_empty().await.unwrap());
        assert!(!fx.lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_budget_split_run_resumes_where_it_left_off() {
        let (fx, worker) =
            fixture_with(RecordingProcessor::new(), Hooks::new(), one_item_budget());
        let job = fx.store.create(attrs(json!(["a", "b", "c"]))).await.unwrap();

        // First invocation: one item, then the time budget trips
        let RunOutcome::Ran(report) = worker.run().await.unwrap() else {
            panic!("expected a run");
        };
        assert_eq!(report.items_processed, 1);
        assert!(report.budget_exhausted);
        assert!(!report.queue_drained);

        let paused = fx.store.get(Some(job.id)).await.unwrap().unwrap();
        assert_eq!(paused.status, JobStatus::Processing);
        assert_eq!(paused.progress, 1);
        assert!(!fx.lock.is_held().await.unwrap());

        // Two more invocations drain the remaining items exactly once each
        worker.run().await.unwrap();
        worker.run().await.unwrap();

        let done = fx.store.get(Some(job.id)).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, 3);
        assert_eq!(*fx.processor.seen.lock(), vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_empty_payload_completes_immediately() {
        let (fx, worker) = fixture_with(RecordingProcessor::new(), Hooks::new(), unlimited());
        let job = fx.store.create(attrs(json!([]))).await.unwrap();

        let RunOutcome::Ran(report) = worker.run().await.unwrap() else {
            panic!("expected a run");
        };
        assert_eq!(report.jobs_completed, 1);
        assert_eq!(report.items_processed, 0);

        let done = fx.store.get(Some(job.id)).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_payload_trips_the_trap() {
        let (fx, worker) = fixture_with(RecordingProcessor::new(), Hooks::new(), unlimited());
        let mut no_payload = serde_json::Map::new();
        no_payload.insert("note".to_string(), json!("no data key"));
        let job = fx.store.create(no_payload).await.unwrap();

        let error = worker.run().await.unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::MissingPayload);

        // The trap failed the job and released the lock
        let failed = fx.store.get(Some(job.id)).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert!(failed
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("no payload"));
        assert!(!fx.lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_item_error_fails_the_whole_job() {
        let (fx, worker) = fixture_with(
            RecordingProcessor::failing_at(1),
            Hooks::new(),
            unlimited(),
        );
        let job = fx.store.create(attrs(json!(["a", "b", "c"]))).await.unwrap();

        let error = worker.run().await.unwrap_err();
        assert_eq!(error.code(), crate::error::ErrorCode::ItemFailed);

        let failed = fx.store.get(Some(job.id)).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        // The first item was processed and persisted before the fault
        assert_eq!(failed.progress, 1);
        assert!(!fx.lock.is_held().await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_busy_touches_nothing() {
        let (fx, worker) = fixture_with(RecordingProcessor::new(), Hooks::new(), unlimited());
        let job = fx.store.create(attrs(json!(["a"]))).await.unwrap();

        // Hold the lock out-of-band
        fx.lock.acquire().await.unwrap();

        let outcome = worker.run().await.unwrap();
        assert!(matches!(outcome, RunOutcome::LockBusy));

        let untouched = fx.store.get(Some(job.id)).await.unwrap().unwrap();
        assert_eq!(untouched.status, JobStatus::Queued);
        assert_eq!(untouched.progress, 0);
        assert!(fx.processor.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_multiple_jobs_drain_in_insertion_order() {
        let (fx, worker) = fixture_with(RecordingProcessor::new(), Hooks::new(), unlimited());
        fx.store.create(attrs(json!(["a1", "a2"]))).await.unwrap();
        fx.store.create(attrs(json!(["b1"]))).await.unwrap();

        let RunOutcome::Ran(report) = worker.run().await.unwrap() else {
            panic!("expected a run");
        };
        assert_eq!(report.jobs_completed, 2);
        assert_eq!(report.items_processed, 3);
        assert!(report.queue_drained);

        assert_eq!(
            *fx.processor.seen.lock(),
            vec![json!("a1"), json!("a2"), json!("b1")]
        );
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_across_updates() {
        let (fx, worker) =
            fixture_with(RecordingProcessor::new(), Hooks::new(), one_item_budget());
        let job = fx.store.create(attrs(json!(["a", "b", "c"]))).await.unwrap();

        let mut last_progress = 0;
        for _ in 0..3 {
            worker.run().await.unwrap();
            let current = fx.store.get(Some(job.id)).await.unwrap().unwrap();
            assert!(current.progress >= last_progress);
            last_progress = current.progress;
        }
        assert_eq!(last_progress, 3);
    }

    #[tokio::test]
    async fn test_time_exceeded_hook_controls_the_budget() {
        let hooks = Hooks::new().with_time_exceeded(|_, _| false);
        let (fx, worker) = fixture_with(RecordingProcessor::new(), hooks, one_item_budget());
        fx.store.create(attrs(json!(["a", "b", "c"]))).await.unwrap();

        // The zero time limit is overridden to "never exceeded"
        let RunOutcome::Ran(report) = worker.run().await.unwrap() else {
            panic!("expected a run");
        };
        assert_eq!(report.items_processed, 3);
        assert!(report.queue_drained);
    }
}
