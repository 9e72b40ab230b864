//! Background worker: claims and executes changeset jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use registry_core::config::Config;
use registry_core::domains::changesets;
use registry_core::kernel::jobs::{
    JobRegistry, JobRunner, JobRunnerConfig, PostgresJobQueue,
};
use registry_core::kernel::ServerDeps;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&db_pool).await?;

    let job_queue = Arc::new(PostgresJobQueue::new(db_pool.clone()));

    let mut registry = JobRegistry::new();
    changesets::jobs::register_jobs(&mut registry);
    let registry = Arc::new(registry);

    let runner_config = JobRunnerConfig {
        batch_size: config.worker_batch_size,
        poll_interval: Duration::from_secs(config.worker_poll_interval_secs),
        ..JobRunnerConfig::default()
    };

    let deps = Arc::new(ServerDeps::new(db_pool, job_queue.clone(), config));

    info!("changeset worker starting");

    let runner = JobRunner::with_config(job_queue, registry, deps, runner_config);
    runner.run_until_shutdown().await
}
