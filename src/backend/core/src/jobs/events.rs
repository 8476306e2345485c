//! Job lifecycle notifications.
//!
//! Every store mutation fires a [`JobEvent`] to the observers registered on
//! the handler's [`EventBus`]. Events are fire-and-forget: no return value
//! is consumed and an observer cannot fail the operation that fired it.
//! There is no ambient global registry; each handler instance owns its bus.

use metrics::counter;
use parking_lot::RwLock;
use std::fmt;
use tracing::{debug, error, info};

use super::job::Job;

/// The kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEventKind {
    Created,
    Updated,
    Completed,
    Failed,
    Deleted,
    Fetched,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
            Self::Fetched => "fetched",
        }
    }
}

impl fmt::Display for JobEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A lifecycle event with a snapshot of the job at firing time.
#[derive(Debug, Clone)]
pub struct JobEvent {
    /// Handler identifier the job belongs to
    pub handler: String,
    /// What happened
    pub kind: JobEventKind,
    /// Job state at the time of the event
    pub job: Job,
}

type Observer = Box<dyn Fn(&JobEvent) + Send + Sync>;

/// Per-handler observer list.
#[derive(Default)]
pub struct EventBus {
    observers: RwLock<Vec<Observer>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Register an observer. Observers run synchronously in registration
    /// order on the emitting task and must not block or panic.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&JobEvent) + Send + Sync + 'static,
    {
        self.observers.write().push(Box::new(observer));
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    /// Fire an event: log it, bump its metric, notify observers.
    pub fn emit(&self, handler: &str, kind: JobEventKind, job: &Job) {
        match kind {
            JobEventKind::Created => {
                info!(handler = handler, job_id = %job.id, "Job created");
                counter!("conveyor_jobs_created_total", "handler" => handler.to_string())
                    .increment(1);
            }
            JobEventKind::Completed => {
                info!(
                    handler = handler,
                    job_id = %job.id,
                    progress = job.progress,
                    "Job completed"
                );
                counter!("conveyor_jobs_completed_total", "handler" => handler.to_string())
                    .increment(1);
            }
            JobEventKind::Failed => {
                error!(
                    handler = handler,
                    job_id = %job.id,
                    progress = job.progress,
                    reason = job.failure_reason.as_deref().unwrap_or(""),
                    "Job failed"
                );
                counter!("conveyor_jobs_failed_total", "handler" => handler.to_string())
                    .increment(1);
            }
            JobEventKind::Deleted => {
                info!(handler = handler, job_id = %job.id, "Job deleted");
                counter!("conveyor_jobs_deleted_total", "handler" => handler.to_string())
                    .increment(1);
            }
            JobEventKind::Updated => {
                debug!(
                    handler = handler,
                    job_id = %job.id,
                    status = %job.status,
                    progress = job.progress,
                    "Job updated"
                );
            }
            JobEventKind::Fetched => {
                debug!(handler = handler, job_id = %job.id, "Job fetched");
            }
        }

        let event = JobEvent {
            handler: handler.to_string(),
            kind,
            job: job.clone(),
        };
        for observer in self.observers.read().iter() {
            observer(&event);
        }
    }
}
