use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Distinct approvals required before a changeset leaves the NEW status.
    pub minimum_changeset_approvals: u32,
    /// How long the job worker sleeps when the queue is empty, in seconds.
    pub worker_poll_interval_secs: u64,
    /// Maximum number of jobs the worker claims per poll.
    pub worker_batch_size: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            minimum_changeset_approvals: env::var("MINIMUM_CHANGESET_APPROVALS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("MINIMUM_CHANGESET_APPROVALS must be a valid number")?,
            worker_poll_interval_secs: env::var("WORKER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("WORKER_POLL_INTERVAL_SECS must be a valid number")?,
            worker_batch_size: env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("WORKER_BATCH_SIZE must be a valid number")?,
        })
    }

    /// Configuration for tests: everything defaulted except the database.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            minimum_changeset_approvals: 2,
            worker_poll_interval_secs: 5,
            worker_batch_size: 10,
        }
    }
}
