//! Storage contract for scheduled jobs.
//!
//! A backend stores jobs keyed by id and hands them out to workers under a
//! lease, so that no two claimants process the same job at the same time.

mod memory;

pub use memory::InMemoryStorage;

use crate::error::JobResult;
use crate::job::{Job, JobId};
use async_trait::async_trait;

/// Storage backend trait.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Adds a job, replacing any stored job with the same id.
    ///
    /// Succeeds even while the id is leased; the stored state is replaced
    /// while any lease on that id stays with its current holder.
    async fn enqueue(&self, job: Job) -> JobResult<()>;

    /// Claims the earliest due, unleased job.
    ///
    /// Returns `Ok(None)` when nothing is due. A job id returned here is not
    /// handed to any other caller until it is deleted or released, or until
    /// its lease expires.
    async fn dequeue(&self) -> JobResult<Option<Job>>;

    /// Removes a job and releases its lease. Deleting an unknown id is a no-op.
    async fn delete(&self, id: &JobId) -> JobResult<()>;

    /// Releases the lease on a job without removing it.
    async fn release_job(&self, id: &JobId) -> JobResult<()>;
}

