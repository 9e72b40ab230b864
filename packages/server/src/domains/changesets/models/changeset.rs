//! Changeset model - SQL persistence layer
//!
//! One changeset describes a proposed bulk edit: what kind of change to
//! apply, how to select the affected citizens, and where it stands in the
//! approval/execution lifecycle. Workflow logic (approval quorum, queueing,
//! execution) lives in the actions module; this file is data and queries.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{CenterId, ChangesetId, CitizenId, UserId};

// ============================================================================
// Enums
// ============================================================================

/// The kind of bulk change a changeset applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "change_kind", rename_all = "snake_case")]
pub enum ChangeKind {
    /// Move registrations to another center
    MoveCenter,
    /// Block citizens from registering and voting
    Block,
    /// Clear the blocked flag
    Unblock,
    /// Revert the effects of another changeset
    Rollback,
}

/// How the affected citizens are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "selection_mode", rename_all = "snake_case")]
pub enum SelectionMode {
    /// Citizens registered at any of the changeset's source centers
    ByCenters,
    /// An explicit uploaded citizen list
    ByUploadedIds,
    /// Citizens actually changed by another changeset
    ByOtherChangeset,
}

/// Lifecycle status of a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "changeset_status", rename_all = "snake_case")]
pub enum ChangesetStatus {
    #[default]
    New,
    Approved,
    Queued,
    Executing,
    Failed,
    Successful,
    PartiallySuccessful,
    RolledBack,
}

impl ChangesetStatus {
    /// Queued to be executed at some point (queued or later).
    pub fn has_been_queued(&self) -> bool {
        !matches!(self, ChangesetStatus::New | ChangesetStatus::Approved)
    }

    /// Finished executing, successfully or not.
    pub fn has_been_executed(&self) -> bool {
        matches!(
            self,
            ChangesetStatus::Failed
                | ChangesetStatus::Successful
                | ChangesetStatus::PartiallySuccessful
                | ChangesetStatus::RolledBack
        )
    }

    /// Still editable; once queued, a changeset is frozen.
    pub fn is_editable(&self) -> bool {
        !self.has_been_queued()
    }

    /// Approvals may still be added or revoked.
    pub fn is_approvable(&self) -> bool {
        self.is_editable()
    }

    /// May be queued for execution.
    pub fn is_queueable(&self) -> bool {
        matches!(self, ChangesetStatus::Approved)
    }

    /// Execution may start.
    pub fn is_executable(&self) -> bool {
        matches!(self, ChangesetStatus::Approved | ChangesetStatus::Queued)
    }

    /// May be targeted by a rollback changeset.
    pub fn is_rollbackable(&self) -> bool {
        matches!(
            self,
            ChangesetStatus::Successful | ChangesetStatus::PartiallySuccessful
        )
    }

    /// May be soft-deleted (never once queued).
    pub fn is_deletable(&self) -> bool {
        !self.has_been_queued()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangesetStatus::New => "new",
            ChangesetStatus::Approved => "approved",
            ChangesetStatus::Queued => "queued",
            ChangesetStatus::Executing => "executing",
            ChangesetStatus::Failed => "failed",
            ChangesetStatus::Successful => "successful",
            ChangesetStatus::PartiallySuccessful => "partially_successful",
            ChangesetStatus::RolledBack => "rolled_back",
        }
    }
}

impl std::fmt::Display for ChangesetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Changeset Model
// ============================================================================

#[derive(sqlx::FromRow, Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Changeset {
    #[builder(default = ChangesetId::new())]
    pub id: ChangesetId,

    pub name: String,
    pub change_kind: ChangeKind,
    pub selection_mode: SelectionMode,

    /// Another changeset to select citizens from or to roll back
    #[builder(default, setter(strip_option))]
    pub other_changeset_id: Option<ChangesetId>,

    /// Destination center; required for center moves
    #[builder(default, setter(strip_option))]
    pub target_center_id: Option<CenterId>,

    /// Optional text message to send to affected voters afterwards
    #[builder(default = String::new())]
    pub message: String,

    /// Reason for the change, with legal references where possible
    #[builder(default = String::new())]
    pub justification: String,

    #[builder(default)]
    pub status: ChangesetStatus,

    #[builder(default, setter(strip_option))]
    pub execution_start_time: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub finish_time: Option<DateTime<Utc>>,

    #[builder(default, setter(strip_option))]
    pub queued_by: Option<UserId>,
    pub created_by: UserId,

    /// If this changeset has been rolled back, the changeset that did it
    #[builder(default, setter(strip_option))]
    pub rollback_changeset_id: Option<ChangesetId>,

    #[builder(default = String::new())]
    pub error_text: String,

    #[builder(default = false)]
    pub deleted: bool,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl Changeset {
    /// Insert the changeset row. Fails on a duplicate name.
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO changesets (
                id, name, change_kind, selection_mode, other_changeset_id,
                target_center_id, message, justification, status, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.change_kind)
        .bind(self.selection_mode)
        .bind(self.other_changeset_id)
        .bind(self.target_center_id)
        .bind(&self.message)
        .bind(&self.justification)
        .bind(self.status)
        .bind(self.created_by)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Find by ID. Soft-deleted changesets are not returned.
    pub async fn find_by_id(id: ChangesetId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM changesets WHERE id = $1 AND deleted = FALSE")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_by_name(name: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM changesets WHERE name = $1 AND deleted = FALSE")
            .bind(name)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// All changesets, most recent first.
    pub async fn list(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM changesets WHERE deleted = FALSE ORDER BY created_at DESC",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Soft-delete if the changeset has not been queued yet.
    ///
    /// Returns whether a row was deleted.
    pub async fn soft_delete(id: ChangesetId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE changesets
            SET deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE AND status IN ('new', 'approved')
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_status(
        id: ChangesetId,
        status: ChangesetStatus,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query("UPDATE changesets SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Record who queued the changeset along with the status change.
    pub async fn mark_queued(id: ChangesetId, queued_by: UserId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE changesets
            SET status = 'queued', queued_by = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(queued_by)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Atomically claim the changeset for execution.
    ///
    /// Transitions an executable changeset to EXECUTING and stamps the start
    /// time in a single conditional update. Returns `None` if the changeset
    /// is no longer executable, e.g. because another worker already claimed
    /// it from a stale status read.
    pub async fn claim_for_execution(id: ChangesetId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE changesets
            SET status = 'executing',
                execution_start_time = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE AND status IN ('approved', 'queued')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Record the terminal status inside the execution transaction.
    pub async fn finish(
        id: ChangesetId,
        status: ChangesetStatus,
        conn: &mut PgConnection,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE changesets
            SET status = $2, finish_time = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Record a failed execution: status, captured error text, finish time.
    ///
    /// Runs on the pool, not the execution transaction, so the FAILED state
    /// survives the transaction being discarded.
    pub async fn mark_failed(id: ChangesetId, error_text: &str, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE changesets
            SET status = 'failed', error_text = $2, finish_time = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error_text)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Mark a changeset as rolled back by `rolled_back_by`.
    pub async fn mark_rolled_back(
        id: ChangesetId,
        rolled_back_by: ChangesetId,
        conn: &mut PgConnection,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE changesets
            SET status = 'rolled_back', rollback_changeset_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(rolled_back_by)
        .execute(conn)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Approvals
    // ========================================================================

    pub async fn approver_ids(&self, pool: &PgPool) -> Result<Vec<UserId>> {
        let rows: Vec<(UserId,)> = sqlx::query_as(
            "SELECT user_id FROM changeset_approvals WHERE changeset_id = $1 ORDER BY created_at",
        )
        .bind(self.id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn approval_count(&self, pool: &PgPool) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM changeset_approvals WHERE changeset_id = $1")
                .bind(self.id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    pub async fn is_approved_by(&self, user_id: UserId, pool: &PgPool) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM changeset_approvals WHERE changeset_id = $1 AND user_id = $2)",
        )
        .bind(self.id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    /// Record an approval. Approving twice is a no-op.
    pub async fn add_approver(&self, user_id: UserId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO changeset_approvals (changeset_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(self.id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Remove an approval. Returns whether the user had approved.
    pub async fn remove_approver(&self, user_id: UserId, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM changeset_approvals WHERE changeset_id = $1 AND user_id = $2",
        )
        .bind(self.id)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Selection inputs
    // ========================================================================

    /// Attach source centers (for by-centers selection).
    pub async fn add_selected_centers(&self, centers: &[CenterId], pool: &PgPool) -> Result<()> {
        for center_id in centers {
            sqlx::query(
                r#"
                INSERT INTO changeset_centers (changeset_id, center_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(self.id)
            .bind(center_id)
            .execute(pool)
            .await?;
        }

        Ok(())
    }

    pub async fn selected_center_ids(&self, pool: &PgPool) -> Result<Vec<CenterId>> {
        let rows: Vec<(CenterId,)> =
            sqlx::query_as("SELECT center_id FROM changeset_centers WHERE changeset_id = $1")
                .bind(self.id)
                .fetch_all(pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Attach an uploaded citizen list (for by-uploaded-ids selection).
    pub async fn add_selected_citizens(
        &self,
        citizens: &[CitizenId],
        pool: &PgPool,
    ) -> Result<()> {
        for citizen_id in citizens {
            sqlx::query(
                r#"
                INSERT INTO changeset_citizens (changeset_id, citizen_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(self.id)
            .bind(citizen_id)
            .execute(pool)
            .await?;
        }

        Ok(())
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// How many citizens this changeset affected (after execution) or would
    /// affect (before).
    pub async fn number_affected(&self, pool: &PgPool) -> Result<i64> {
        use super::change_record::ChangeRecord;
        use crate::domains::changesets::selection;

        if self.status.has_been_executed() {
            ChangeRecord::count_changed(self.id, pool).await
        } else {
            let mut conn = pool.acquire().await?;
            let citizens = selection::citizens_to_change(self, &mut *conn).await?;
            Ok(citizens.len() as i64)
        }
    }

    /// How many selected citizens could not be changed (or undone).
    pub async fn number_not_changed(&self, pool: &PgPool) -> Result<i64> {
        use super::change_record::ChangeRecord;

        ChangeRecord::count_unchanged(self.id, pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_predicates() {
        use ChangesetStatus::*;

        for status in [New, Approved] {
            assert!(status.is_editable());
            assert!(status.is_approvable());
            assert!(status.is_deletable());
            assert!(!status.has_been_queued());
        }

        for status in [Queued, Executing, Failed, Successful, PartiallySuccessful, RolledBack] {
            assert!(status.has_been_queued());
            assert!(!status.is_editable());
            assert!(!status.is_deletable());
        }

        assert!(Approved.is_queueable());
        assert!(!New.is_queueable());
        assert!(!Queued.is_queueable());

        assert!(Approved.is_executable());
        assert!(Queued.is_executable());
        assert!(!Executing.is_executable());
        assert!(!Successful.is_executable());

        assert!(Successful.is_rollbackable());
        assert!(PartiallySuccessful.is_rollbackable());
        assert!(!Failed.is_rollbackable());
        assert!(!RolledBack.is_rollbackable());

        for status in [Failed, Successful, PartiallySuccessful, RolledBack] {
            assert!(status.has_been_executed());
        }
        for status in [New, Approved, Queued, Executing] {
            assert!(!status.has_been_executed());
        }
    }

    #[test]
    fn status_display_matches_storage_form() {
        assert_eq!(ChangesetStatus::PartiallySuccessful.to_string(), "partially_successful");
        assert_eq!(ChangesetStatus::New.to_string(), "new");
    }

    #[test]
    fn builder_defaults() {
        let changeset = Changeset::builder()
            .name("move center 12 to 14")
            .change_kind(ChangeKind::MoveCenter)
            .selection_mode(SelectionMode::ByCenters)
            .created_by(UserId::new())
            .build();

        assert_eq!(changeset.status, ChangesetStatus::New);
        assert!(changeset.other_changeset_id.is_none());
        assert!(changeset.error_text.is_empty());
        assert!(!changeset.deleted);
    }
}
