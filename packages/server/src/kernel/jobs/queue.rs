//! PostgreSQL-backed job queue implementation.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::job::{ErrorKind, Job};

/// Result of a submit that accounts for idempotency.
#[derive(Debug, Clone)]
pub enum EnqueueResult {
    /// A new job row was created
    Created(Uuid),
    /// A pending/running job with the same idempotency key already exists
    Duplicate(Uuid),
}

impl EnqueueResult {
    /// Get the job ID regardless of whether it was created or duplicate
    pub fn job_id(&self) -> Uuid {
        match self {
            EnqueueResult::Created(id) | EnqueueResult::Duplicate(id) => *id,
        }
    }

    /// Returns true if this was a newly created job
    pub fn is_created(&self) -> bool {
        matches!(self, EnqueueResult::Created(_))
    }
}

/// A claimed job ready for execution.
#[derive(Debug)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub job: Job,
}

impl ClaimedJob {
    /// Deserialize the command payload.
    pub fn deserialize<C: DeserializeOwned>(&self) -> Result<C> {
        let args = self
            .job
            .args
            .as_ref()
            .ok_or_else(|| anyhow!("job {} has no args", self.id))?;
        serde_json::from_value(args.clone())
            .map_err(|e| anyhow!("failed to deserialize command: {}", e))
    }

    /// Get the command type (job_type)
    pub fn command_type(&self) -> &str {
        &self.job.job_type
    }
}

/// Metadata a command provides so it can be stored as a job.
pub trait CommandMeta {
    /// The command type name (used as job_type).
    fn command_type(&self) -> &'static str;

    /// The domain entity this command is about.
    fn reference_id(&self) -> Uuid;

    /// Optional idempotency key.
    ///
    /// If provided, only one pending/running job may exist with this key.
    fn idempotency_key(&self) -> Option<String> {
        None
    }

    /// Maximum retries at the job level.
    fn max_retries(&self) -> i32 {
        0
    }
}

/// A serialized command ready for submission.
///
/// Built from any `Serialize + CommandMeta` type; this indirection keeps the
/// [`JobQueue`] trait object-safe so deps can hold an `Arc<dyn JobQueue>`.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_type: &'static str,
    pub args: serde_json::Value,
    pub reference_id: Uuid,
    pub idempotency_key: Option<String>,
    pub max_retries: i32,
}

impl JobSpec {
    /// Serialize a command into a submit-ready spec.
    pub fn for_command<C>(command: &C) -> Result<Self>
    where
        C: Serialize + CommandMeta,
    {
        Ok(Self {
            job_type: command.command_type(),
            args: serde_json::to_value(command)?,
            reference_id: command.reference_id(),
            idempotency_key: command.idempotency_key(),
            max_retries: command.max_retries(),
        })
    }
}

/// Trait for job queue operations.
///
/// Implementations provide the storage and retrieval of serialized commands
/// for background execution. Test doubles live in [`super::testing`].
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit a command for asynchronous execution.
    ///
    /// If the spec carries an idempotency key and a matching pending/running
    /// job exists, returns `EnqueueResult::Duplicate` with the existing id.
    async fn submit(&self, spec: JobSpec) -> Result<EnqueueResult>;

    /// Claim up to `limit` jobs for processing.
    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>>;

    /// Mark a job as successfully completed.
    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job as failed with an error.
    ///
    /// If retries remain and the error is retryable, a retry row is queued;
    /// otherwise the job is dead-lettered.
    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()>;
}

/// PostgreSQL-backed job queue implementation.
pub struct PostgresJobQueue {
    db_pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn submit(&self, spec: JobSpec) -> Result<EnqueueResult> {
        if let Some(key) = &spec.idempotency_key {
            if let Some(existing) = Job::find_active_by_idempotency_key(key, &self.db_pool).await?
            {
                return Ok(EnqueueResult::Duplicate(existing.id));
            }
        }

        let job = Job::builder()
            .job_type(spec.job_type)
            .args(spec.args)
            .reference_id(spec.reference_id)
            .max_retries(spec.max_retries);
        let job = match spec.idempotency_key {
            Some(key) => job.idempotency_key(key).build(),
            None => job.build(),
        };

        let inserted = job.insert(&self.db_pool).await?;
        info!(job_id = %inserted.id, job_type = %inserted.job_type, "job submitted");

        Ok(EnqueueResult::Created(inserted.id))
    }

    async fn claim(&self, worker_id: &str, limit: i64) -> Result<Vec<ClaimedJob>> {
        let jobs = Job::claim(limit, worker_id, &self.db_pool).await?;

        Ok(jobs
            .into_iter()
            .map(|job| ClaimedJob { id: job.id, job })
            .collect())
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error: &str, kind: ErrorKind) -> Result<()> {
        let job = Job::find_by_id(job_id, &self.db_pool).await?;

        if kind.should_retry() && job.retry_count < job.max_retries {
            // Schedule a retry row with exponential backoff
            let delay_secs = 2i64.pow(job.retry_count as u32).min(3600);
            let retry_at = chrono::Utc::now() + chrono::Duration::seconds(delay_secs);

            let retry = Job::builder()
                .job_type(job.job_type.clone())
                .reference_id(job.reference_id)
                .run_at(retry_at)
                .max_retries(job.max_retries)
                .retry_count(job.retry_count + 1);
            let retry = match job.args.clone() {
                Some(args) => retry.args(args).build(),
                None => retry.build(),
            };
            retry.insert(&self.db_pool).await?;

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed',
                    error_message = $1,
                    error_kind = $2,
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.db_pool)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'dead_letter',
                    error_message = $1,
                    error_kind = $2,
                    updated_at = NOW()
                WHERE id = $3
                "#,
            )
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&self.db_pool)
            .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct TestCommand {
        reference: Uuid,
    }

    impl CommandMeta for TestCommand {
        fn command_type(&self) -> &'static str {
            "test_command"
        }

        fn reference_id(&self) -> Uuid {
            self.reference
        }

        fn idempotency_key(&self) -> Option<String> {
            Some(format!("test_command:{}", self.reference))
        }
    }

    #[test]
    fn enqueue_result_helpers() {
        let created = EnqueueResult::Created(Uuid::now_v7());
        assert!(created.is_created());

        let duplicate = EnqueueResult::Duplicate(Uuid::now_v7());
        assert!(!duplicate.is_created());
    }

    #[test]
    fn job_spec_captures_command_metadata() {
        let reference = Uuid::now_v7();
        let spec = JobSpec::for_command(&TestCommand { reference }).unwrap();
        assert_eq!(spec.job_type, "test_command");
        assert_eq!(spec.reference_id, reference);
        assert_eq!(
            spec.idempotency_key.as_deref(),
            Some(format!("test_command:{reference}").as_str())
        );
        assert_eq!(spec.args["reference"], reference.to_string());
    }
}
