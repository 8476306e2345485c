//! Background job engine for Conveyor Core.
//!
//! The engine runs item-by-item workloads in bounded slices:
//!
//! - **Job + state machine**: structured documents with forward-only status
//!   transitions and resumable progress
//! - **Process lock**: TTL-bounded mutual exclusion over the cache
//! - **Budget guard**: time/memory thresholds checked at item boundaries
//! - **Worker**: the chunked processing loop over an [`ItemProcessor`]
//! - **Dispatcher**: the guarded entry point and outbound self-trigger
//! - **Health-check**: the recurring interval that keeps the queue draining
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────┐
//! │                         Worker Invocation                              │
//! ├────────────────────────────────────────────────────────────────────────┤
//! │  trigger ──▶ maybe_handle ──▶ lock ──▶ ┌─────────────────────────────┐ │
//! │  (HTTP /                               │  per job: per item:         │ │
//! │   health-check)                        │   process → persist → check │ │
//! │                                        │   budget                    │ │
//! │                                        └──────────────┬──────────────┘ │
//! │                                                       │                │
//! │          queue drained: clear health-check ◀──────────┤                │
//! │          work remains:  release lock + re-dispatch ◀──┘                │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use conveyor_core::jobs::{Dispatcher, ItemProcessor, Hooks};
//!
//! let dispatcher = Dispatcher::builder("reports")
//!     .kv_store(kv)
//!     .cache(cache)
//!     .processor(Arc::new(MyProcessor))
//!     .trigger(Arc::new(HttpSelfTrigger::new(base_url, timeout)?))
//!     .settings(config.worker.clone())
//!     .build()?;
//!
//! let job = dispatcher.create_job(attrs).await?;
//! ```

pub mod budget;
pub mod dispatch;
pub mod events;
pub mod healthcheck;
pub mod hooks;
pub mod job;
pub mod lock;
pub mod processor;
pub mod worker;

mod builtin;

pub use budget::{BudgetGuard, BudgetStatus};
pub use builtin::WebhookDeliveryProcessor;
pub use dispatch::{
    DispatchOutcome, Dispatcher, DispatcherBuilder, HttpSelfTrigger, SelfTrigger, TriggerTokens,
    TRIGGER_TOKEN_HEADER,
};
pub use events::{EventBus, JobEvent, JobEventKind};
pub use healthcheck::HealthcheckBinding;
pub use hooks::Hooks;
pub use job::{Job, JobId, JobStatus};
pub use lock::ProcessLock;
pub use processor::{ItemContext, ItemError, ItemProcessor, ItemResult};
pub use worker::{RunOutcome, RunReport, Worker};
