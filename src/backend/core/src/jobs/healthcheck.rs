//! Health-check scheduler binding.
//!
//! The self-trigger request can be lost — constrained hosts throttle
//! loopback requests, proxies drop them, processes restart. The
//! health-check is the self-healing fallback: a recurring interval
//! (default 5 minutes) that re-triggers the worker while non-terminal jobs
//! remain and unregisters itself once the queue drains.
//!
//! Each tick: a held lock means a worker is active, do nothing; an empty
//! queue means the work is done, clear the registration; otherwise fire
//! the trigger.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatch::SelfTrigger;
use super::lock::ProcessLock;
use crate::store::JobStore;
use crate::telemetry::metrics;

struct Registration {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Recurring re-trigger interval for one handler.
pub struct HealthcheckBinding {
    handler: String,
    period: Duration,
    lock: ProcessLock,
    store: JobStore,
    trigger: Arc<dyn SelfTrigger>,
    token: String,
    registration: parking_lot::Mutex<Option<Registration>>,
}

impl HealthcheckBinding {
    /// Create an unregistered binding.
    pub fn new(
        handler: impl Into<String>,
        period: Duration,
        lock: ProcessLock,
        store: JobStore,
        trigger: Arc<dyn SelfTrigger>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            handler: handler.into(),
            period,
            lock,
            store,
            trigger,
            token: token.into(),
            registration: parking_lot::Mutex::new(None),
        }
    }

    /// Name of the recurring interval.
    pub fn interval_name(&self) -> String {
        format!("{}_healthcheck", self.handler)
    }

    /// Whether the interval is currently registered.
    pub fn is_registered(&self) -> bool {
        self.registration
            .lock()
            .as_ref()
            .is_some_and(|registration| !registration.task.is_finished())
    }

    /// Register the recurring interval if it is not already running.
    pub fn ensure_registered(self: &Arc<Self>) {
        let mut registration = self.registration.lock();
        if let Some(existing) = registration.as_ref() {
            if !existing.task.is_finished() {
                return;
            }
        }

        let cancel = CancellationToken::new();
        let tick_cancel = cancel.clone();
        let binding = self.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(binding.period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; the dispatch that caused
            // registration already triggered the worker, so skip it
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = tick_cancel.cancelled() => break,
                    _ = interval.tick() => binding.tick().await,
                }
            }
        });

        info!(
            interval = %self.interval_name(),
            period_secs = self.period.as_secs(),
            label = format!("Conveyor worker health-check for '{}'", self.handler),
            "Health-check interval registered"
        );
        *registration = Some(Registration { cancel, task });
    }

    /// Clear the pending registration.
    pub fn unregister(&self) {
        if let Some(registration) = self.registration.lock().take() {
            registration.cancel.cancel();
            info!(interval = %self.interval_name(), "Health-check interval cleared");
        }
    }

    /// One interval firing.
    async fn tick(&self) {
        metrics::record_healthcheck_tick(&self.handler);

        match self.lock.is_held().await {
            Ok(true) => {
                debug!(handler = %self.handler, "Worker active; health-check idle");
                return;
            }
            Ok(false) => {}
            Err(error) => {
                warn!(handler = %self.handler, error = %error, "Health-check lock probe failed");
                return;
            }
        }

        match self.store.queue_is_empty().await {
            Ok(true) => {
                debug!(handler = %self.handler, "Queue drained; clearing health-check");
                self.unregister();
                return;
            }
            Ok(false) => {}
            Err(error) => {
                warn!(handler = %self.handler, error = %error, "Health-check queue probe failed");
                return;
            }
        }

        let result = self.trigger.fire(&self.handler, &self.token).await;
        metrics::record_dispatch(&self.handler, result.is_ok());
        if let Err(error) = result {
            warn!(
                handler = %self.handler,
                error = %error,
                "Health-check dispatch failed; will retry next interval"
            );
        }
    }
}

impl Drop for HealthcheckBinding {
    fn drop(&mut self) {
        if let Some(registration) = self.registration.lock().take() {
            registration.cancel.cancel();
        }
    }
}
