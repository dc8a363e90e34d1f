//! Job scheduling configuration.

use crate::error::JobResult;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Configuration for the job scheduling engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Worker loop configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// In-memory storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl JobsConfig {
    /// Loads configuration from `{config_dir}/jobs.toml` (if present),
    /// overridden by `CADENCE__SECTION__KEY` environment variables.
    pub fn load(config_dir: impl AsRef<Path>) -> JobResult<Self> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let path = config_dir.as_ref().join("jobs.toml");
        let mut builder = Config::builder();
        if path.exists() {
            debug!(path = %path.display(), "Loading jobs config");
            builder = builder.add_source(File::from(path).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("CADENCE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Worker loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Wait between polls when no job is due, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Wait after a storage failure outside job processing, in milliseconds.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            error_backoff_ms: default_error_backoff(),
        }
    }
}

impl SchedulerConfig {
    /// Returns poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns error backoff as Duration.
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// In-memory storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// How long a claim survives without being released, in milliseconds.
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_ms: u64,

    /// Wait between attempts when another claimant won the lease, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            lease_timeout_ms: default_lease_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl StorageConfig {
    /// Returns lease timeout as Duration.
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    /// Returns poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    100 // 100ms
}

fn default_error_backoff() -> u64 {
    1000
}

fn default_lease_timeout() -> u64 {
    10_000 // 10 seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = JobsConfig::default();
        assert_eq!(config.scheduler.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.scheduler.error_backoff(), Duration::from_secs(1));
        assert_eq!(config.storage.lease_timeout(), Duration::from_secs(10));
        assert_eq!(config.storage.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: JobsConfig = parse_toml(
            r#"
            [storage]
            lease_timeout_ms = 2500
            "#,
        );
        assert_eq!(config.storage.lease_timeout_ms, 2500);
        assert_eq!(config.storage.poll_interval_ms, 100);
        assert_eq!(config.scheduler.poll_interval_ms, 100);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("jobs.toml")).unwrap();
        writeln!(file, "[scheduler]\npoll_interval_ms = 25\nerror_backoff_ms = 50").unwrap();

        let config = JobsConfig::load(dir.path()).unwrap();
        assert_eq!(config.scheduler.poll_interval_ms, 25);
        assert_eq!(config.scheduler.error_backoff_ms, 50);
        assert_eq!(config.storage.lease_timeout_ms, 10_000);
    }

    #[test]
    fn test_load_missing_directory_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = JobsConfig::load(dir.path().join("absent")).unwrap();
        assert_eq!(config.storage.lease_timeout_ms, 10_000);
    }

    fn parse_toml(source: &str) -> JobsConfig {
        Config::builder()
            .add_source(File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
