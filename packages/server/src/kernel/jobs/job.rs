//! Job model for background command execution.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use typed_builder::TypedBuilder;
use uuid::Uuid;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    DeadLetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    pub job_type: String,

    #[builder(default, setter(strip_option))]
    pub args: Option<serde_json::Value>,

    #[builder(default)]
    pub status: JobStatus,

    /// The domain entity this job is about (e.g. a changeset id).
    pub reference_id: Uuid,

    #[builder(default, setter(strip_option))]
    pub idempotency_key: Option<String>,

    #[builder(default = Utc::now())]
    pub run_at: DateTime<Utc>,

    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,

    #[builder(default = 0)]
    pub max_retries: i32,
    #[builder(default = 0)]
    pub retry_count: i32,

    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_kind: Option<ErrorKind>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Insert the job row.
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO jobs (
                id, job_type, args, status, reference_id, idempotency_key,
                run_at, max_retries, retry_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.job_type)
        .bind(&self.args)
        .bind(self.status)
        .bind(self.reference_id)
        .bind(&self.idempotency_key)
        .bind(self.run_at)
        .bind(self.max_retries)
        .bind(self.retry_count)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Find a job by ID.
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    /// Find a pending or running job by idempotency key.
    pub async fn find_active_by_idempotency_key(
        key: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM jobs
            WHERE idempotency_key = $1
              AND status IN ('pending', 'running')
            LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Claim up to `limit` ready jobs for `worker_id`.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the
    /// same job.
    pub async fn claim(limit: i64, worker_id: &str, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE jobs
            SET status = 'running',
                worker_id = $2,
                updated_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending' AND run_at <= NOW()
                ORDER BY run_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(worker_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
