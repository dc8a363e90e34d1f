//! Scheduler: handler registry and the worker loop that drives it.

use crate::config::SchedulerConfig;
use crate::error::{JobError, JobResult};
use crate::job::Job;
use crate::metrics::JobMetrics;
use crate::storage::Storage;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Job handler function type.
pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, JobResult<()>> + Send + Sync>;

/// Callback notified of every failure. The job is `None` for failures that
/// happen outside the processing of a specific job.
pub type ExceptionHandler = Arc<dyn Fn(Option<&Job>, &JobError) + Send + Sync>;

/// Collects handlers and settings before a [`Scheduler`] is built.
pub struct SchedulerBuilder<S: Storage + ?Sized> {
    storage: Arc<S>,
    handlers: HashMap<String, JobHandler>,
    exception_handler: Option<ExceptionHandler>,
    config: SchedulerConfig,
}

impl<S: Storage + ?Sized + 'static> SchedulerBuilder<S> {
    /// Create a builder for a scheduler backed by `storage`.
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            handlers: HashMap::new(),
            exception_handler: None,
            config: SchedulerConfig::default(),
        }
    }

    /// Register the handler for `job_type`.
    ///
    /// Fails with [`JobError::Configuration`] if the type already has one.
    pub fn with_handler<F, Fut>(mut self, job_type: impl Into<String>, handler: F) -> JobResult<Self>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult<()>> + Send + 'static,
    {
        let job_type = job_type.into();
        if self.handlers.contains_key(&job_type) {
            return Err(JobError::Configuration(format!(
                "Job type '{}' already has a handler",
                job_type
            )));
        }

        let handler_fn: JobHandler = Arc::new(move |job: Job| handler(job).boxed());
        debug!(job_type = %job_type, "Registered job handler");
        self.handlers.insert(job_type, handler_fn);
        Ok(self)
    }

    /// Install the exception hook, replacing any previous one.
    pub fn with_exception_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Option<&Job>, &JobError) + Send + Sync + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Override the worker loop settings.
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the scheduler. The worker loop is not started.
    pub fn build(self) -> Scheduler<S> {
        Scheduler {
            inner: Arc::new(Inner {
                storage: self.storage,
                handlers: self.handlers,
                exception_handler: self.exception_handler,
                config: self.config,
                stop_requested: AtomicBool::new(false),
                wake: Notify::new(),
            }),
            worker: Mutex::new(None),
        }
    }
}

/// Runs one worker loop that claims due jobs and dispatches them to handlers.
///
/// Jobs are processed one at a time. Several schedulers may share a storage
/// backend; the backend's leases keep them from processing the same job.
pub struct Scheduler<S: Storage + ?Sized> {
    inner: Arc<Inner<S>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Storage + ?Sized + 'static> Scheduler<S> {
    /// Start building a scheduler backed by `storage`.
    pub fn builder(storage: Arc<S>) -> SchedulerBuilder<S> {
        SchedulerBuilder::new(storage)
    }

    /// Store a job for later processing.
    pub async fn enqueue(&self, job: Job) -> JobResult<()> {
        let id = job.id().clone();
        let job_type = job.job_type().to_string();
        let execute_at = job.execute_at();

        self.inner.storage.enqueue(job).await?;

        JobMetrics::job_enqueued(&job_type);
        info!(
            job_id = %id,
            job_type = %job_type,
            execute_at = %execute_at.to_rfc3339(),
            "Enqueued job"
        );
        Ok(())
    }

    /// Launch the worker loop on the current tokio runtime.
    ///
    /// Returns as soon as the loop is spawned.
    pub fn start(&self) -> JobResult<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(JobError::AlreadyRunning);
        }

        self.inner.stop_requested.store(false, Ordering::SeqCst);
        let inner = self.inner.clone();
        *worker = Some(tokio::spawn(
            inner.run().instrument(tracing::info_span!("scheduler")),
        ));

        info!(handlers = self.inner.handlers.len(), "Scheduler started");
        Ok(())
    }

    /// Ask the worker loop to stop and wait for it to exit.
    ///
    /// A job already claimed is processed to completion first. Calling this
    /// on a stopped scheduler does nothing.
    pub async fn stop(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        info!("Stopping scheduler...");
        self.inner.request_stop();

        if let Err(e) = handle.await {
            error!(error = %e, "Worker loop terminated abnormally");
        }
        info!("Scheduler stopped");
    }

    /// Check if the worker loop is running.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<S: Storage + ?Sized> Drop for Scheduler<S> {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            self.inner.request_stop();
        }
    }
}

struct Inner<S: ?Sized> {
    storage: Arc<S>,
    handlers: HashMap<String, JobHandler>,
    exception_handler: Option<ExceptionHandler>,
    config: SchedulerConfig,
    stop_requested: AtomicBool,
    wake: Notify,
}

impl<S: Storage + ?Sized> Inner<S> {
    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    async fn run(self: Arc<Self>) {
        debug!("Worker loop started");

        loop {
            let pause = match self.storage.dequeue().await {
                Ok(Some(job)) => {
                    self.process(job).await;
                    None
                }
                Ok(None) => Some(self.config.poll_interval()),
                Err(e) => {
                    JobMetrics::storage_error("dequeue");
                    self.report(None, &e);
                    Some(self.config.error_backoff())
                }
            };

            if self.stop_requested() {
                break;
            }
            if let Some(pause) = pause {
                self.idle(pause).await;
                if self.stop_requested() {
                    break;
                }
            }
        }

        debug!("Worker loop exited");
    }

    /// Sleeps for `duration` unless a stop request arrives first.
    async fn idle(&self, duration: Duration) {
        let notified = self.wake.notified();
        tokio::pin!(notified);
        // Enabled before the flag check; notify_waiters only wakes registered waiters.
        notified.as_mut().enable();
        if self.stop_requested() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = notified => {}
        }
    }

    async fn process(&self, job: Job) {
        let started = Instant::now();
        JobMetrics::job_dequeued(job.job_type());
        debug!(job_id = %job.id(), job_type = %job.job_type(), "Processing job");

        match self.dispatch(&job).await {
            Ok(()) => {
                JobMetrics::job_succeeded(job.job_type(), job.is_recurring(), started.elapsed());
                self.handle_success(job).await;
            }
            Err(err) => {
                JobMetrics::job_failed(job.job_type(), error_kind(&err), started.elapsed());
                self.report(Some(&job), &err);
                self.handle_failure(job, err).await;
            }
        }
    }

    async fn dispatch(&self, job: &Job) -> JobResult<()> {
        let handler = self
            .handlers
            .get(job.job_type())
            .ok_or_else(|| JobError::Dispatch {
                job_type: job.job_type().to_string(),
            })?;

        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(job.clone()))) {
            Ok(future) => future,
            Err(panic) => return Err(handler_panic(panic.as_ref())),
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(handler_panic(panic.as_ref())),
        }
    }

    async fn handle_success(&self, job: Job) {
        if job.is_recurring() {
            match job.with_next_execution_at() {
                Ok(next) => {
                    let next_at = next.execute_at();
                    if self.requeue(&job, next).await {
                        info!(
                            job_id = %job.id(),
                            job_type = %job.job_type(),
                            next_execution_at = %next_at.to_rfc3339(),
                            "Processed recurring job"
                        );
                    }
                    return;
                }
                // No next occurrence exists, so the job ends here.
                Err(e) => self.report(Some(&job), &e),
            }
        }

        match self.storage.delete(job.id()).await {
            Ok(()) => info!(job_id = %job.id(), job_type = %job.job_type(), "Processed job"),
            Err(e) => self.storage_failure("delete", &job, &e),
        }
    }

    /// Applies the retry policy to a job whose attempt just failed.
    async fn handle_failure(&self, job: Job, err: JobError) {
        let failed = job.with_error(&err);

        if failed.should_retry() {
            let attempt = failed.error_count();
            if self.requeue(&job, failed).await {
                JobMetrics::job_retried(job.job_type(), attempt);
                warn!(
                    job_id = %job.id(),
                    job_type = %job.job_type(),
                    error_count = attempt,
                    error = %err,
                    "Re-queued job"
                );
            }
            return;
        }

        match self.storage.delete(job.id()).await {
            Ok(()) => {
                JobMetrics::job_discarded(job.job_type());
                error!(
                    job_id = %job.id(),
                    job_type = %job.job_type(),
                    error_count = failed.error_count(),
                    error = %err,
                    "Deleted job after exhausting retries"
                );
            }
            Err(e) => self.storage_failure("delete", &job, &e),
        }
    }

    /// Stores `next` in place of the leased `job`, then releases the lease.
    /// Returns false after reporting a storage failure.
    async fn requeue(&self, job: &Job, next: Job) -> bool {
        if let Err(e) = self.storage.enqueue(next).await {
            self.storage_failure("enqueue", job, &e);
            return false;
        }
        if let Err(e) = self.storage.release_job(job.id()).await {
            self.storage_failure("release_job", job, &e);
            return false;
        }
        true
    }

    /// Reports a storage failure hit while applying policy to `job`. The job
    /// stays leased and becomes eligible again once its lease expires.
    fn storage_failure(&self, operation: &str, job: &Job, err: &JobError) {
        JobMetrics::storage_error(operation);
        self.report(Some(job), err);
    }

    /// Logs a failure and forwards it to the exception hook.
    fn report(&self, job: Option<&Job>, err: &JobError) {
        match job {
            Some(job) => error!(
                job_id = %job.id(),
                job_type = %job.job_type(),
                error = %err,
                "Failed to process job"
            ),
            None => error!(error = %err, "Scheduler error"),
        }

        if let Some(hook) = &self.exception_handler {
            if std::panic::catch_unwind(AssertUnwindSafe(|| hook(job, err))).is_err() {
                error!("Exception handler panicked");
            }
        }
    }
}

fn error_kind(err: &JobError) -> &'static str {
    match err {
        JobError::Dispatch { .. } => "dispatch",
        JobError::Handler(_) => "handler",
        JobError::Schedule(_) => "schedule",
        JobError::Storage(_) => "storage",
        JobError::Serialization(_) => "serialization",
        JobError::Configuration(_) => "configuration",
        JobError::AlreadyRunning => "already_running",
    }
}

fn handler_panic(panic: &(dyn Any + Send)) -> JobError {
    JobError::Handler(format!("handler panicked: {}", panic_message(panic)))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
