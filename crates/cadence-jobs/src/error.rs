//! Job error types.

use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Invalid scheduler setup, such as a second handler for the same job type.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A dequeued job has a type nobody registered a handler for.
    #[error("No handler for job type '{job_type}'")]
    Dispatch { job_type: String },

    /// The user-supplied handler failed.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// A requested execution time is outside the representable date range.
    #[error("Invalid schedule: {0}")]
    Schedule(String),

    /// A storage backend operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `start` was called on a scheduler whose worker loop is already running.
    #[error("Scheduler already running")]
    AlreadyRunning,
}

impl JobError {
    /// Creates a handler failure from any displayable error.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        JobError::Handler(err.to_string())
    }

    /// Creates a storage failure from any displayable error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        JobError::Storage(err.to_string())
    }

    /// Returns true if this error belongs to the processing of one specific job
    /// and is resolved through that job's retry policy.
    pub fn is_job_scoped(&self) -> bool {
        matches!(self, JobError::Dispatch { .. } | JobError::Handler(_))
    }
}

impl From<config::ConfigError> for JobError {
    fn from(err: config::ConfigError) -> Self {
        JobError::Configuration(err.to_string())
    }
}
