//! Dispatcher: the guarded worker entry point and the self-trigger.
//!
//! The worker is (re-)triggered at three moments: when a job is created,
//! after every invocation that leaves work behind, and from the periodic
//! health-check. All three paths go through [`Dispatcher::dispatch`],
//! which makes sure the health-check registration exists and then fires
//! the outbound self-trigger.
//!
//! The inbound side is [`Dispatcher::maybe_handle`], guarded by three
//! preconditions — lock free, queue non-empty, valid trigger token — each
//! of which ends the invocation without touching job state when unmet.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::events::EventBus;
use super::healthcheck::HealthcheckBinding;
use super::hooks::Hooks;
use super::job::Job;
use super::lock::ProcessLock;
use super::processor::ItemProcessor;
use super::worker::{RunOutcome, RunReport, Worker};
use crate::cache::CacheBackend;
use crate::config::WorkerSettings;
use crate::error::{ConveyorError, Result};
use crate::store::{JobStore, KvStore};
use crate::telemetry::metrics;

/// Header carrying the per-handler trigger token.
pub const TRIGGER_TOKEN_HEADER: &str = "x-conveyor-token";

// ═══════════════════════════════════════════════════════════════════════════════
// Self Trigger
// ═══════════════════════════════════════════════════════════════════════════════

/// The outbound self-trigger primitive.
///
/// Failure is reported as an error value, never raised across the
/// dispatch path; the health-check is the backstop that eventually
/// retries regardless.
#[async_trait]
pub trait SelfTrigger: Send + Sync {
    /// Fire an authenticated trigger request for `handler`.
    async fn fire(&self, handler: &str, token: &str) -> Result<()>;
}

/// HTTP self-trigger: posts to this process's own worker endpoint.
pub struct HttpSelfTrigger {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSelfTrigger {
    /// Create a trigger posting to `{base_url}/worker/{handler}`.
    ///
    /// The timeout is deliberately short: the trigger endpoint detaches
    /// the invocation and acknowledges at once, so the caller only needs
    /// to know the request arrived.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConveyorError::dispatch_failed(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SelfTrigger for HttpSelfTrigger {
    async fn fire(&self, handler: &str, token: &str) -> Result<()> {
        let url = format!("{}/worker/{}", self.base_url, handler);
        let response = self
            .client
            .post(&url)
            .header(TRIGGER_TOKEN_HEADER, token)
            .send()
            .await
            .map_err(|e| ConveyorError::dispatch_failed(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ConveyorError::dispatch_failed(format!(
                "trigger endpoint returned {}",
                response.status()
            )))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Trigger Tokens
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-handler trigger tokens, derived from a shared secret.
///
/// The token scopes a trigger request to one handler identifier; it is not
/// a user-authentication scheme.
pub struct TriggerTokens {
    secret: String,
}

impl TriggerTokens {
    /// Create a token issuer from a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Create a token issuer with a random secret.
    pub fn random() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Issue the token for a handler.
    pub fn issue(&self, handler: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(handler.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify a token against a handler.
    pub fn verify(&self, handler: &str, token: &str) -> bool {
        self.issue(handler) == token
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dispatcher
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of an inbound trigger.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The worker ran; see the report
    Ran(RunReport),
    /// Another worker holds the lock; nothing was touched
    LockHeld,
    /// The queue holds no work; nothing was touched
    QueueEmpty,
}

/// One handler's complete processing pipeline.
pub struct Dispatcher {
    handler: String,
    store: JobStore,
    lock: ProcessLock,
    worker: Worker,
    healthcheck: Arc<HealthcheckBinding>,
    trigger: Arc<dyn SelfTrigger>,
    tokens: TriggerTokens,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Start building a dispatcher for a handler identifier.
    pub fn builder(handler: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(handler)
    }

    /// The handler identifier.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    /// The job store, for management surfaces (API, CLI).
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// The process lock, for operator intervention.
    pub fn lock(&self) -> &ProcessLock {
        &self.lock
    }

    /// The health-check binding.
    pub fn healthcheck(&self) -> &Arc<HealthcheckBinding> {
        &self.healthcheck
    }

    /// The trigger token for this handler, for external callers.
    pub fn trigger_token(&self) -> String {
        self.tokens.issue(&self.handler)
    }

    /// Check a trigger token without running anything.
    pub fn verify_token(&self, token: &str) -> bool {
        self.tokens.verify(&self.handler, token)
    }

    /// The guarded entry point.
    ///
    /// Preconditions, each exiting without starting work: (a) no other
    /// worker holds the lock, (b) the queue is non-empty, (c) the token is
    /// valid for this handler. When all hold, runs the processing loop,
    /// then either re-dispatches (work remains) or clears the health-check
    /// registration (queue drained).
    ///
    /// # Errors
    ///
    /// An invalid token is an error; the other precondition misses are
    /// ordinary [`DispatchOutcome`] values. A fatal processing fault
    /// surfaces after the failure trap has run.
    #[instrument(skip_all, fields(handler = %self.handler))]
    pub async fn maybe_handle(&self, token: &str) -> Result<DispatchOutcome> {
        if !self.tokens.verify(&self.handler, token) {
            return Err(ConveyorError::invalid_token(&self.handler));
        }
        if self.lock.is_held().await? {
            debug!("Worker already running; ignoring trigger");
            return Ok(DispatchOutcome::LockHeld);
        }
        if self.store.queue_is_empty().await? {
            debug!("Queue empty; ignoring trigger");
            return Ok(DispatchOutcome::QueueEmpty);
        }

        match self.worker.run().await? {
            RunOutcome::LockBusy => Ok(DispatchOutcome::LockHeld),
            RunOutcome::Ran(report) => {
                if report.queue_drained {
                    // Completion cleanup
                    self.healthcheck.unregister();
                } else if let Err(error) = self.dispatch().await {
                    warn!(
                        error = %error,
                        "Re-dispatch failed; the health-check interval will retry"
                    );
                }
                Ok(DispatchOutcome::Ran(report))
            }
        }
    }

    /// Trigger a new asynchronous invocation of the worker.
    ///
    /// Ensures the health-check registration exists first, so a lost
    /// trigger request cannot strand the queue.
    pub async fn dispatch(&self) -> Result<()> {
        self.healthcheck.ensure_registered();

        let result = self
            .trigger
            .fire(&self.handler, &self.tokens.issue(&self.handler))
            .await;
        metrics::record_dispatch(&self.handler, result.is_ok());
        result
    }

    /// Create a job and trigger the worker.
    ///
    /// A failed trigger is logged, not surfaced: the job is persisted
    /// either way and the health-check will pick it up.
    pub async fn create_job(&self, attrs: serde_json::Map<String, serde_json::Value>) -> Result<Job> {
        let job = self.store.create(attrs).await?;
        if let Err(error) = self.dispatch().await {
            warn!(
                job_id = %job.id,
                error = %error,
                "Dispatch after create failed; the health-check interval will retry"
            );
        }
        Ok(job)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Builder assembling a [`Dispatcher`] from its collaborators.
pub struct DispatcherBuilder {
    handler: String,
    kv: Option<Arc<dyn KvStore>>,
    cache: Option<Arc<dyn CacheBackend>>,
    processor: Option<Arc<dyn ItemProcessor>>,
    trigger: Option<Arc<dyn SelfTrigger>>,
    settings: WorkerSettings,
    hooks: Hooks,
    events: Option<Arc<EventBus>>,
    trigger_secret: Option<String>,
}

impl DispatcherBuilder {
    fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            kv: None,
            cache: None,
            processor: None,
            trigger: None,
            settings: WorkerSettings::default(),
            hooks: Hooks::new(),
            events: None,
            trigger_secret: None,
        }
    }

    /// Persistent key-value store for job documents.
    pub fn kv_store(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// TTL cache for the process lock.
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The per-item handler for this job type.
    pub fn processor(mut self, processor: Arc<dyn ItemProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// The outbound self-trigger implementation.
    pub fn trigger(mut self, trigger: Arc<dyn SelfTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Worker settings (budgets, TTLs, payload key).
    pub fn settings(mut self, settings: WorkerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Deployment override hooks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Observer bus for lifecycle events.
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Secret for trigger token derivation. Random when unset.
    pub fn trigger_secret(mut self, secret: impl Into<String>) -> Self {
        self.trigger_secret = Some(secret.into());
        self
    }

    /// Assemble the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a required collaborator (store,
    /// cache, processor, trigger) was not supplied.
    pub fn build(self) -> Result<Arc<Dispatcher>> {
        let kv = self
            .kv
            .ok_or_else(|| ConveyorError::configuration("Dispatcher requires a kv_store"))?;
        let cache = self
            .cache
            .ok_or_else(|| ConveyorError::configuration("Dispatcher requires a cache"))?;
        let processor = self
            .processor
            .ok_or_else(|| ConveyorError::configuration("Dispatcher requires a processor"))?;
        let trigger = self
            .trigger
            .ok_or_else(|| ConveyorError::configuration("Dispatcher requires a trigger"))?;

        self.settings.validate();

        let hooks = Arc::new(self.hooks);
        let events = self.events.unwrap_or_else(|| Arc::new(EventBus::new()));
        let tokens = match self.trigger_secret {
            Some(secret) => TriggerTokens::new(secret),
            None => TriggerTokens::random(),
        };

        let store = JobStore::new(
            kv,
            self.handler.clone(),
            self.settings.created_by.clone(),
            hooks.clone(),
            events,
        );
        let lock = ProcessLock::new(cache, &self.handler, self.settings.lock_ttl, hooks.clone());
        let worker = Worker::new(
            store.clone(),
            lock.clone(),
            processor,
            hooks,
            self.settings.clone(),
        );
        let healthcheck = Arc::new(HealthcheckBinding::new(
            self.handler.clone(),
            self.settings.healthcheck_interval,
            lock.clone(),
            store.clone(),
            trigger.clone(),
            tokens.issue(&self.handler),
        ));

        Ok(Arc::new(Dispatcher {
            handler: self.handler,
            store,
            lock,
            worker,
            healthcheck,
            trigger,
            tokens,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
