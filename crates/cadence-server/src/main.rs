//! # Cadence Server
//!
//! Host process for a Cadence job scheduler backed by in-memory storage.
//! Registers a recurring heartbeat job and runs until Ctrl+C or SIGTERM,
//! then drains the worker loop before exiting.

use cadence_jobs::{register_metrics, InMemoryStorage, Job, JobsConfig, Scheduler};
use chrono::Utc;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

const HEARTBEAT_JOB: &str = "heartbeat";
const HEARTBEAT_INTERVAL_MS: i64 = 30_000;

#[tokio::main]
async fn main() {
    init_logging();

    info!("Starting Cadence Server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_dir = std::env::var("CADENCE_CONFIG_DIR").unwrap_or_else(|_| "./config".to_string());
    let config = JobsConfig::load(&config_dir)?;
    info!(
        config_dir = %config_dir,
        poll_interval_ms = config.scheduler.poll_interval_ms,
        lease_timeout_ms = config.storage.lease_timeout_ms,
        "Configuration loaded"
    );

    register_metrics();

    let storage = Arc::new(InMemoryStorage::with_config(&config.storage));
    let scheduler = Scheduler::builder(storage)
        .with_config(config.scheduler)
        .with_handler(HEARTBEAT_JOB, |job| async move {
            let lag_ms = (Utc::now() - job.execute_at()).num_milliseconds();
            info!(job_id = %job.id(), lag_ms, "Heartbeat");
            Ok(())
        })?
        .with_exception_handler(|job, err| {
            warn!(job_id = ?job.map(|j| j.id().as_str()), error = %err, "Job failure reported");
        })
        .build();

    scheduler
        .enqueue(Job::new(HEARTBEAT_JOB, HEARTBEAT_JOB).with_recurring(HEARTBEAT_INTERVAL_MS))
        .await?;
    scheduler.start()?;

    shutdown_signal().await;
    scheduler.stop().await;

    info!("Server shutdown complete");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cadence_jobs=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
