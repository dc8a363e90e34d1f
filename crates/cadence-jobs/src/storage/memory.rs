//! In-memory storage implementation.
//!
//! Jobs and leases live in one map pair behind a single mutex. The mutex is
//! never held across an await point: claiming a job selects a candidate and
//! leases it in two separate critical sections, sleeping between attempts
//! when another claimant wins the race.

use super::Storage;
use crate::config::StorageConfig;
use crate::error::JobResult;
use crate::job::{Job, JobId};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    /// Lease expiry per claimed job id.
    leases: HashMap<JobId, Instant>,
}

impl State {
    fn expire_leases(&mut self, now: Instant) {
        self.leases.retain(|id, expires_at| {
            let alive = *expires_at > now;
            if !alive {
                debug!(job_id = %id, "Lease expired");
            }
            alive
        });
    }
}

/// Outcome of one attempt to lease a selected job.
enum Claim {
    Acquired(Job),
    /// Another claimant leased the job first.
    Contended,
    /// The job was deleted or rescheduled after it was selected.
    Vanished,
}

/// In-memory storage backend.
///
/// Data is not persisted across restarts.
pub struct InMemoryStorage {
    state: Mutex<State>,
    lease_timeout: Duration,
    poll_interval: Duration,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage with default timings.
    pub fn new() -> Self {
        Self::with_config(&StorageConfig::default())
    }

    /// Create a new empty in-memory storage.
    pub fn with_config(config: &StorageConfig) -> Self {
        Self {
            state: Mutex::new(State::default()),
            lease_timeout: config.lease_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    /// Number of stored jobs, leased or not.
    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().jobs.is_empty()
    }

    /// Returns a copy of the stored job with this id.
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.state.lock().jobs.get(id).cloned()
    }

    /// Whether `id` currently has an unexpired lease.
    pub fn is_leased(&self, id: &JobId) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .leases
            .get(id)
            .is_some_and(|expires_at| *expires_at > now)
    }

    /// Picks the due, unleased job with the smallest execution time.
    fn next_candidate(&self) -> Option<JobId> {
        let now = Utc::now();
        let mut state = self.state.lock();
        state.expire_leases(Instant::now());

        state
            .jobs
            .values()
            .filter(|job| job.is_due(now) && !state.leases.contains_key(job.id()))
            .min_by(|a, b| {
                a.execute_at()
                    .cmp(&b.execute_at())
                    .then_with(|| a.id().cmp(b.id()))
            })
            .map(|job| job.id().clone())
    }

    fn try_lease(&self, id: &JobId) -> Claim {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.expire_leases(now);

        if state.leases.contains_key(id) {
            return Claim::Contended;
        }

        let job = match state.jobs.get(id) {
            Some(job) if job.is_due(Utc::now()) => job.clone(),
            _ => return Claim::Vanished,
        };

        state.leases.insert(id.clone(), now + self.lease_timeout);
        Claim::Acquired(job)
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn enqueue(&self, job: Job) -> JobResult<()> {
        self.state.lock().jobs.insert(job.id().clone(), job);
        Ok(())
    }

    async fn dequeue(&self) -> JobResult<Option<Job>> {
        loop {
            let Some(id) = self.next_candidate() else {
                return Ok(None);
            };

            match self.try_lease(&id) {
                Claim::Acquired(job) => {
                    debug!(job_id = %id, job_type = %job.job_type(), "Leased job");
                    return Ok(Some(job));
                }
                Claim::Contended => {
                    debug!(job_id = %id, "Lost lease race, retrying");
                    tokio::time::sleep(self.poll_interval).await;
                }
                Claim::Vanished => {}
            }
        }
    }

    async fn delete(&self, id: &JobId) -> JobResult<()> {
        let mut state = self.state.lock();
        state.jobs.remove(id);
        state.leases.remove(id);
        Ok(())
    }

    async fn release_job(&self, id: &JobId) -> JobResult<()> {
        self.state.lock().leases.remove(id);
        Ok(())
    }
}
