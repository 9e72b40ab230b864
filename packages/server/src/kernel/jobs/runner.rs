//! Job runner service for processing background jobs.
//!
//! The `JobRunner` polls the database for ready jobs, executes them via the
//! registry, and records the outcome. Retries are handled by the job queue's
//! `mark_failed` implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::queue::JobQueue;
use super::registry::SharedJobRegistry;
use super::ErrorKind;
use crate::kernel::ServerDeps;

/// Configuration for the job runner.
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            poll_interval: Duration::from_secs(5),
            worker_id: format!("runner-{}", Uuid::now_v7()),
        }
    }
}

/// Background service that processes jobs from the queue.
pub struct JobRunner {
    job_queue: Arc<dyn JobQueue>,
    registry: SharedJobRegistry,
    deps: Arc<ServerDeps>,
    config: JobRunnerConfig,
    shutdown: Arc<AtomicBool>,
}

impl JobRunner {
    pub fn new(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
    ) -> Self {
        Self {
            job_queue,
            registry,
            deps,
            config: JobRunnerConfig::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(
        job_queue: Arc<dyn JobQueue>,
        registry: SharedJobRegistry,
        deps: Arc<ServerDeps>,
        config: JobRunnerConfig,
    ) -> Self {
        Self {
            job_queue,
            registry,
            deps,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Run the job runner until shutdown is requested.
    pub async fn run(self) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            "job runner starting"
        );

        loop {
            if self.is_shutdown_requested() {
                break;
            }

            let jobs = match self
                .job_queue
                .claim(&self.config.worker_id, self.config.batch_size)
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            if jobs.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            debug!(count = jobs.len(), "claimed jobs");

            for job in jobs {
                if self.is_shutdown_requested() {
                    break;
                }

                let job_id = job.id;
                let job_type = job.command_type().to_string();

                match self.registry.execute(&job, self.deps.clone()).await {
                    Ok(()) => {
                        info!(job_id = %job_id, job_type = %job_type, "job succeeded");
                        if let Err(e) = self.job_queue.mark_succeeded(job_id).await {
                            error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                        }
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, job_type = %job_type, error = %e, "job failed");

                        let error_kind = classify_error(&e);
                        if let Err(mark_err) = self
                            .job_queue
                            .mark_failed(job_id, &e.to_string(), error_kind)
                            .await
                        {
                            error!(job_id = %job_id, error = %mark_err, "failed to mark job as failed");
                        }
                    }
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job runner stopped");
        Ok(())
    }

    /// Run until a Ctrl+C signal is received.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let shutdown = self.shutdown_handle();

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
            shutdown.store(true, Ordering::SeqCst);
        });

        self.run().await
    }
}

/// Classify an error to determine retry behavior.
fn classify_error(error: &anyhow::Error) -> ErrorKind {
    let error_str = error.to_string().to_lowercase();

    // Non-retryable: bad payloads and anything a retry cannot fix
    if error_str.contains("not found")
        || error_str.contains("invalid")
        || error_str.contains("permission denied")
        || error_str.contains("deserialize")
        || error_str.contains("unknown job type")
    {
        return ErrorKind::NonRetryable;
    }

    // Everything else (network errors, timeouts, ...) is retryable
    ErrorKind::Retryable
}
