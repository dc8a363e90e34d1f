//! Job entity and scheduling policy.

use crate::error::{JobError, JobResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Delay applied by [`Job::with_next_execution_at`] when the job has no
/// recurrence interval of its own.
pub const DEFAULT_RECURRING_DELAY_MS: i64 = 5000;

/// Unique job identifier, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One unit of scheduled work.
///
/// Policy-changing methods never mutate `self`; each returns a fresh `Job`,
/// so a copy already handed to storage is unaffected by later transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,

    /// Selects the handler.
    #[serde(rename = "type")]
    job_type: String,

    /// The job is due once this is at or before now.
    execute_at: DateTime<Utc>,

    /// Message of the most recent failure.
    last_error: Option<String>,

    error_count: u32,

    /// Negative means unlimited retries.
    max_retries: i32,

    /// Non-positive means one-shot.
    recurring_delay_ms: i64,
}

impl Job {
    /// Creates a one-shot job due now, with unlimited retries.
    pub fn new(id: impl Into<JobId>, job_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type: job_type.into(),
            execute_at: Utc::now(),
            last_error: None,
            error_count: 0,
            max_retries: -1,
            recurring_delay_ms: 0,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn execute_at(&self) -> DateTime<Utc> {
        self.execute_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn max_retries(&self) -> i32 {
        self.max_retries
    }

    pub fn recurring_delay_ms(&self) -> i64 {
        self.recurring_delay_ms
    }

    /// Returns a copy scheduled for `at`.
    #[must_use]
    pub fn with_execution_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            execute_at: at,
            ..self.clone()
        }
    }

    /// Returns a copy scheduled `delay` from now.
    ///
    /// Fails with [`JobError::Schedule`] if the resulting time is out of range.
    pub fn with_delay(&self, delay: Duration) -> JobResult<Self> {
        let at = ChronoDuration::from_std(delay)
            .ok()
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .ok_or_else(|| JobError::Schedule(format!("delay of {:?} is out of range", delay)))?;
        Ok(self.with_execution_at(at))
    }

    /// Returns the next occurrence of this job.
    ///
    /// The new execution time is anchored on the previously scheduled time,
    /// not on the wall clock, so a slow worker does not accumulate drift. Jobs
    /// without a recurrence interval advance by [`DEFAULT_RECURRING_DELAY_MS`].
    ///
    /// Fails with [`JobError::Schedule`] if the next occurrence is past the
    /// representable date range.
    pub fn with_next_execution_at(&self) -> JobResult<Self> {
        let delay_ms = if self.recurring_delay_ms > 0 {
            self.recurring_delay_ms
        } else {
            DEFAULT_RECURRING_DELAY_MS
        };
        let next = ChronoDuration::try_milliseconds(delay_ms)
            .and_then(|delay| self.execute_at.checked_add_signed(delay))
            .ok_or_else(|| {
                JobError::Schedule(format!(
                    "next occurrence of {} + {}ms is out of range",
                    self.execute_at.to_rfc3339(),
                    delay_ms
                ))
            })?;
        Ok(self.with_execution_at(next))
    }

    /// Returns a copy with the given retry limit. Negative means unlimited.
    #[must_use]
    pub fn with_max_retries(&self, max_retries: i32) -> Self {
        Self {
            max_retries,
            ..self.clone()
        }
    }

    /// Returns a copy that recurs every `delay_ms` milliseconds on success.
    #[must_use]
    pub fn with_recurring(&self, delay_ms: i64) -> Self {
        Self {
            recurring_delay_ms: delay_ms,
            ..self.clone()
        }
    }

    /// Returns a copy that records `err` as a failed attempt.
    #[must_use]
    pub fn with_error(&self, err: impl fmt::Display) -> Self {
        Self {
            last_error: Some(err.to_string()),
            error_count: self.error_count.saturating_add(1),
            ..self.clone()
        }
    }

    /// Whether a failed job should be put back in the queue.
    pub fn should_retry(&self) -> bool {
        match u32::try_from(self.max_retries) {
            Ok(max_retries) => self.error_count <= max_retries,
            Err(_) => true,
        }
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring_delay_ms > 0
    }

    /// Whether the job may run at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.execute_at <= now
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> JobResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_generation() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_job_defaults() {
        let before = Utc::now();
        let job = Job::new("job-1", "email");

        assert_eq!(job.id().as_str(), "job-1");
        assert_eq!(job.job_type(), "email");
        assert!(job.execute_at() >= before);
        assert_eq!(job.error_count(), 0);
        assert_eq!(job.last_error(), None);
        assert_eq!(job.max_retries(), -1);
        assert!(!job.is_recurring());
    }

    #[test]
    fn test_unlimited_retries_always_retry() {
        let mut job = Job::new("job-1", "email").with_max_retries(-1);
        for _ in 0..50 {
            job = job.with_error("fail");
            assert!(job.should_retry());
        }
        assert_eq!(job.error_count(), 50);
    }

    #[test]
    fn test_should_retry_up_to_max_retries() {
        let job = Job::new("job-1", "email").with_max_retries(2);
        assert!(job.should_retry());

        let job = job.with_error("first");
        assert!(job.should_retry());
        let job = job.with_error("second");
        assert!(job.should_retry());
        let job = job.with_error("third");
        assert!(!job.should_retry());
    }

    #[test]
    fn test_zero_retries_stop_after_first_failure() {
        let job = Job::new("job-1", "email").with_max_retries(0);
        assert!(job.should_retry());

        let failed = job.with_error("boom");
        assert_eq!(failed.error_count(), 1);
        assert!(!failed.should_retry());
    }

    #[test]
    fn test_is_recurring() {
        let job = Job::new("job-1", "report");
        assert!(!job.with_recurring(0).is_recurring());
        assert!(!job.with_recurring(-10).is_recurring());
        assert!(job.with_recurring(1).is_recurring());
    }

    #[test]
    fn test_next_execution_uses_recurring_delay() {
        let at = Utc::now();
        let job = Job::new("job-1", "report")
            .with_execution_at(at)
            .with_recurring(5000);

        let next = job.with_next_execution_at().unwrap();
        assert_eq!(next.execute_at(), at + ChronoDuration::milliseconds(5000));
    }

    #[test]
    fn test_next_execution_defaults_without_recurrence() {
        let at = Utc::now();
        let job = Job::new("job-1", "report").with_execution_at(at);

        let next = job.with_next_execution_at().unwrap();
        assert_eq!(
            next.execute_at(),
            at + ChronoDuration::milliseconds(DEFAULT_RECURRING_DELAY_MS)
        );
    }

    #[test]
    fn test_next_execution_anchors_on_scheduled_time() {
        let at = Utc::now() - ChronoDuration::hours(1);
        let job = Job::new("job-1", "report")
            .with_execution_at(at)
            .with_recurring(60_000);

        let next = job
            .with_next_execution_at()
            .and_then(|job| job.with_next_execution_at())
            .unwrap();
        assert_eq!(next.execute_at(), at + ChronoDuration::minutes(2));
        assert!(!next.is_due(at + ChronoDuration::seconds(119)));
    }

    #[test]
    fn test_next_execution_out_of_range_is_error() {
        let job = Job::new("job-1", "report").with_recurring(i64::MAX);
        assert!(matches!(job.with_next_execution_at(), Err(JobError::Schedule(_))));

        let job = Job::new("job-1", "report")
            .with_execution_at(DateTime::<Utc>::MAX_UTC)
            .with_recurring(1);
        assert!(matches!(job.with_next_execution_at(), Err(JobError::Schedule(_))));
    }

    #[test]
    fn test_with_error_records_message_and_count() {
        let job = Job::new("job-1", "email").with_error("smtp down");
        assert_eq!(job.last_error(), Some("smtp down"));
        assert_eq!(job.error_count(), 1);

        let job = job.with_error("still down");
        assert_eq!(job.last_error(), Some("still down"));
        assert_eq!(job.error_count(), 2);
    }

    #[test]
    fn test_transitions_leave_original_untouched() {
        let original = Job::new("job-1", "email");
        let snapshot = original.clone();

        let _ = original.with_error("boom");
        let _ = original.with_max_retries(3);
        let _ = original.with_recurring(1000);
        let _ = original.with_next_execution_at().unwrap();

        assert_eq!(original, snapshot);
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let job = Job::new("job-1", "email").with_execution_at(now);
        assert!(job.is_due(now));
        assert!(!job.is_due(now - ChronoDuration::milliseconds(1)));
    }

    #[test]
    fn test_with_delay_schedules_in_future() {
        let job = Job::new("job-1", "email")
            .with_delay(Duration::from_secs(60))
            .unwrap();
        assert!(!job.is_due(Utc::now()));
    }

    #[test]
    fn test_with_delay_out_of_range_is_error() {
        let job = Job::new("job-1", "email");
        assert!(matches!(job.with_delay(Duration::MAX), Err(JobError::Schedule(_))));
        assert!(matches!(
            job.with_delay(Duration::from_secs(10_000_000 * 365 * 86_400)),
            Err(JobError::Schedule(_))
        ));
    }

    #[test]
    fn test_job_json_round_trip_keeps_policy() {
        let job = Job::new("job-1", "email")
            .with_max_retries(3)
            .with_recurring(2500)
            .with_error("timeout");

        let json = job.to_json().unwrap();
        assert!(json.contains("\"type\":\"email\""));
        let restored = Job::from_json(&json).unwrap();
        assert_eq!(restored, job);
    }
}
