//! Cadence Jobs - In-Process Job Scheduling
//!
//! Callers enqueue typed jobs with a target execution time; a worker loop
//! claims due jobs from storage and dispatches them to the handler registered
//! for their type, then applies retry and recurrence policy:
//! - Upsert-by-id storage contract with leased, exclusive claims
//! - Reference in-memory backend with lease expiry for crashed workers
//! - Per-job retry limits (or unlimited retries) with error accounting
//! - Drift-free recurring jobs
//! - Graceful start/stop that finishes in-flight work
//!
//! # Architecture
//!
//! ```text
//!   caller ──enqueue──▶ Scheduler ──enqueue──▶ ┌──────────────────────┐
//!                                              │       Storage        │
//!                       ┌──────── dequeue ◀────│  jobs + lease table  │
//!                       ▼                      └──────────────────────┘
//!                 worker loop                            ▲
//!                       │                                │
//!              handler registry                          │
//!                       │                                │
//!          ┌────────────┴─────────────┐                  │
//!          ▼                          ▼                  │
//!       success                    failure               │
//!   one-shot: delete        retry: enqueue(+error) ──────┤
//!   recurring: enqueue next  exhausted: delete ──────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence_jobs::{InMemoryStorage, Job, Scheduler};
//! use std::sync::Arc;
//!
//! let storage = Arc::new(InMemoryStorage::new());
//! let scheduler = Scheduler::builder(storage)
//!     .with_handler("send_email", |job| async move {
//!         println!("sending email for {}", job.id());
//!         Ok(())
//!     })?
//!     .with_exception_handler(|job, err| eprintln!("{:?} failed: {}", job.map(|j| j.id()), err))
//!     .build();
//!
//! scheduler.enqueue(Job::new("welcome-42", "send_email").with_max_retries(3)).await?;
//! scheduler.start()?;
//! // ...
//! scheduler.stop().await;
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod metrics;
pub mod scheduler;
pub mod storage;

pub use config::{JobsConfig, SchedulerConfig, StorageConfig};
pub use error::{JobError, JobResult};
pub use job::{Job, JobId, DEFAULT_RECURRING_DELAY_MS};
pub use metrics::{register_metrics, JobMetrics};
pub use scheduler::{ExceptionHandler, JobHandler, Scheduler, SchedulerBuilder};
pub use storage::{InMemoryStorage, Storage};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::job::{Job, JobId};
    pub use crate::scheduler::Scheduler;
    pub use crate::storage::{InMemoryStorage, Storage};
    pub use crate::{JobError, JobResult};
}
