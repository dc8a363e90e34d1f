//! Shared helpers for scheduler integration tests.

use cadence_jobs::{InMemoryStorage, SchedulerConfig, StorageConfig};
use std::sync::Arc;
use std::time::Duration;

/// Storage with short timings so tests do not wait on production defaults.
pub fn fast_storage() -> Arc<InMemoryStorage> {
    Arc::new(InMemoryStorage::with_config(&StorageConfig {
        lease_timeout_ms: 10_000,
        poll_interval_ms: 2,
    }))
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval_ms: 5,
        error_backoff_ms: 5,
    }
}

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
