//! Deployment override hooks.
//!
//! Each hook is a pure function taking the computed default (and context
//! where relevant) and returning a possibly-modified value. Hooks are
//! supplied at construction time on the handler instance; there is no
//! process-wide hook registry.

use serde_json::{Map, Value};
use std::time::Duration;

use super::budget::BudgetStatus;

type AttrsHook = dyn Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync;
type DurationHook = dyn Fn(Duration) -> Duration + Send + Sync;
type BudgetHook = dyn Fn(bool, &BudgetStatus) -> bool + Send + Sync;

/// Override points for a handler instance.
///
/// # Example
///
/// ```rust,ignore
/// // Disable memory checking and halve the lock TTL.
/// let hooks = Hooks::new()
///     .with_memory_exceeded(|_, _| false)
///     .with_lock_ttl(|default| default / 2);
/// ```
#[derive(Default)]
pub struct Hooks {
    new_job_attrs: Option<Box<AttrsHook>>,
    lock_ttl: Option<Box<DurationHook>>,
    time_limit: Option<Box<DurationHook>>,
    time_exceeded: Option<Box<BudgetHook>>,
    memory_exceeded: Option<Box<BudgetHook>>,
}

impl Hooks {
    /// Create a hook set with every override absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the attributes of a new job before it is persisted.
    ///
    /// The job's `id` is re-applied after the hook runs; it cannot be
    /// changed from here.
    pub fn with_new_job_attrs<F>(mut self, hook: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Map<String, Value> + Send + Sync + 'static,
    {
        self.new_job_attrs = Some(Box::new(hook));
        self
    }

    /// Override the TTL of the process lock entry.
    pub fn with_lock_ttl<F>(mut self, hook: F) -> Self
    where
        F: Fn(Duration) -> Duration + Send + Sync + 'static,
    {
        self.lock_ttl = Some(Box::new(hook));
        self
    }

    /// Override the wall-clock budget of an invocation.
    pub fn with_time_limit<F>(mut self, hook: F) -> Self
    where
        F: Fn(Duration) -> Duration + Send + Sync + 'static,
    {
        self.time_limit = Some(Box::new(hook));
        self
    }

    /// Override the time-exceeded determination.
    pub fn with_time_exceeded<F>(mut self, hook: F) -> Self
    where
        F: Fn(bool, &BudgetStatus) -> bool + Send + Sync + 'static,
    {
        self.time_exceeded = Some(Box::new(hook));
        self
    }

    /// Override the memory-exceeded determination.
    pub fn with_memory_exceeded<F>(mut self, hook: F) -> Self
    where
        F: Fn(bool, &BudgetStatus) -> bool + Send + Sync + 'static,
    {
        self.memory_exceeded = Some(Box::new(hook));
        self
    }

    pub(crate) fn apply_new_job_attrs(&self, default: Map<String, Value>) -> Map<String, Value> {
        match &self.new_job_attrs {
            Some(hook) => hook(default),
            None => default,
        }
    }

    pub(crate) fn apply_lock_ttl(&self, default: Duration) -> Duration {
        match &self.lock_ttl {
            Some(hook) => hook(default),
            None => default,
        }
    }

    pub(crate) fn apply_time_limit(&self, default: Duration) -> Duration {
        match &self.time_limit {
            Some(hook) => hook(default),
            None => default,
        }
    }

    pub(crate) fn apply_time_exceeded(&self, default: bool, status: &BudgetStatus) -> bool {
        match &self.time_exceeded {
            Some(hook) => hook(default, status),
            None => default,
        }
    }

    pub(crate) fn apply_memory_exceeded(&self, default: bool, status: &BudgetStatus) -> bool {
        match &self.memory_exceeded {
            Some(hook) => hook(default, status),
            None => default,
        }
    }
}
