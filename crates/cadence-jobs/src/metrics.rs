//! Job scheduling metrics.
//!
//! Emitted through the `metrics` facade; the host application decides
//! whether and where they are exported.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the scheduling engine.
pub mod names {
    /// Total jobs enqueued through a scheduler.
    pub const JOBS_ENQUEUED_TOTAL: &str = "cadence_jobs_enqueued_total";
    /// Total jobs claimed by a worker loop.
    pub const JOBS_DEQUEUED_TOTAL: &str = "cadence_jobs_dequeued_total";
    /// Total one-shot jobs completed and deleted.
    pub const JOBS_COMPLETED_TOTAL: &str = "cadence_jobs_completed_total";
    /// Total recurring jobs rescheduled after success.
    pub const JOBS_RESCHEDULED_TOTAL: &str = "cadence_jobs_rescheduled_total";
    /// Total job failures (dispatch or handler).
    pub const JOBS_FAILED_TOTAL: &str = "cadence_jobs_failed_total";
    /// Total failed jobs put back in the queue.
    pub const JOBS_RETRIED_TOTAL: &str = "cadence_jobs_retried_total";
    /// Total failed jobs deleted after exhausting retries.
    pub const JOBS_DISCARDED_TOTAL: &str = "cadence_jobs_discarded_total";
    /// Total storage failures seen by the worker loop.
    pub const STORAGE_ERRORS_TOTAL: &str = "cadence_storage_errors_total";

    /// Handler execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "cadence_job_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(
        names::JOBS_DEQUEUED_TOTAL,
        "Total number of jobs claimed for processing"
    );
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of one-shot jobs completed"
    );
    describe_counter!(
        names::JOBS_RESCHEDULED_TOTAL,
        "Total number of recurring jobs rescheduled"
    );
    describe_counter!(names::JOBS_FAILED_TOTAL, "Total number of job failures");
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");
    describe_counter!(
        names::JOBS_DISCARDED_TOTAL,
        "Total number of jobs deleted after exhausting retries"
    );
    describe_counter!(
        names::STORAGE_ERRORS_TOTAL,
        "Total number of storage failures in the worker loop"
    );
    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job handler duration in seconds"
    );
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued(job_type: &str) {
        counter!(names::JOBS_ENQUEUED_TOTAL, "job_type" => job_type.to_string()).increment(1);
    }

    /// Record a job dequeued.
    pub fn job_dequeued(job_type: &str) {
        counter!(names::JOBS_DEQUEUED_TOTAL, "job_type" => job_type.to_string()).increment(1);
    }

    /// Record a successful handler run.
    pub fn job_succeeded(job_type: &str, recurring: bool, duration: Duration) {
        let name = if recurring {
            names::JOBS_RESCHEDULED_TOTAL
        } else {
            names::JOBS_COMPLETED_TOTAL
        };
        counter!(name, "job_type" => job_type.to_string()).increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "status" => "succeeded"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed dispatch or handler run.
    pub fn job_failed(job_type: &str, error_type: &str, duration: Duration) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "job_type" => job_type.to_string(),
            "error_type" => error_type.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job put back in the queue after a failure.
    pub fn job_retried(job_type: &str, attempt: u32) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "job_type" => job_type.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Record a job deleted after exhausting retries.
    pub fn job_discarded(job_type: &str) {
        counter!(names::JOBS_DISCARDED_TOTAL, "job_type" => job_type.to_string()).increment(1);
    }

    /// Record a storage failure.
    pub fn storage_error(operation: &str) {
        counter!(names::STORAGE_ERRORS_TOTAL, "operation" => operation.to_string()).increment(1);
    }
}
