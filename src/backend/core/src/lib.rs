//! # Conveyor Core
//!
//! Resumable, budget-aware background job processing for request-bounded
//! runtimes.
//!
//! Conveyor runs long item-by-item workloads in environments that cannot
//! sustain a long-lived process. Each worker invocation is bounded by a
//! time/memory budget, persists progress after every item, and re-triggers
//! itself over HTTP (with a periodic health-check as the backstop) until the
//! job queue drains.
//!
//! ## Architecture
//!
//! - **Job Store**: CRUD + filtered listing over job documents in a
//!   key-value store (memory or Redis)
//! - **Process Lock**: TTL-bounded mutual exclusion preventing overlapping
//!   worker invocations
//! - **Budget Guard**: wall-clock and memory thresholds checked at item
//!   boundaries, both overridable
//! - **Worker**: the chunked, resumable processing loop over a pluggable
//!   [`ItemProcessor`](jobs::ItemProcessor)
//! - **Dispatcher**: the guarded entry point plus the outbound self-trigger
//! - **Health-check**: a recurring interval that re-triggers the worker when
//!   a self-trigger request is lost

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod store;
pub mod telemetry;

pub use error::{ConveyorError, ErrorCode, ErrorContext, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CacheBackend, MemoryCache, RedisCache};
    pub use crate::config::{BackendKind, Config, WorkerSettings};
    pub use crate::error::{ConveyorError, ErrorCode, ErrorContext, Result};
    pub use crate::jobs::{
        Dispatcher, DispatcherBuilder, DispatchOutcome, Hooks, ItemContext, ItemError,
        ItemProcessor, ItemResult, Job, JobEvent, JobEventKind, JobId, JobStatus, RunReport,
        SelfTrigger,
    };
    pub use crate::store::{JobStore, KvStore, ListOrder, ListOrderBy, MemoryKvStore, RedisKvStore};
}
