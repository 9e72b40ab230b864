//! Kernel module - server infrastructure and dependencies.

pub mod jobs;

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use jobs::JobQueue;

/// Shared dependencies handed to actions and job handlers.
///
/// Holds the database pool, the job queue used to dispatch background work,
/// and the loaded configuration.
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub job_queue: Arc<dyn JobQueue>,
    pub config: Config,
}

impl ServerDeps {
    pub fn new(db_pool: PgPool, job_queue: Arc<dyn JobQueue>, config: Config) -> Self {
        Self {
            db_pool,
            job_queue,
            config,
        }
    }

    /// The approval quorum for changesets.
    pub fn minimum_changeset_approvals(&self) -> u32 {
        self.config.minimum_changeset_approvals
    }
}
