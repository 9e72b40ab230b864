//! ChangeRecord model - the append-only execution ledger.
//!
//! One record per citizen per changeset execution, stating whether the
//! citizen was actually changed. Some of this information is redundant for a
//! forward changeset (the kind and target center could be looked up on the
//! changeset), but not for a rollback: there the applied kind and centers
//! come from the record being undone, so they are stored here.
//!
//! Records are only ever created during execution; they are never updated or
//! deleted.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use typed_builder::TypedBuilder;

use crate::common::{CenterId, ChangeRecordId, ChangesetId, CitizenId};

use super::changeset::ChangeKind;

#[derive(sqlx::FromRow, Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct ChangeRecord {
    #[builder(default = ChangeRecordId::new())]
    pub id: ChangeRecordId,

    pub changeset_id: ChangesetId,
    pub citizen_id: CitizenId,

    /// The change actually applied; an undo of a block is recorded as an
    /// unblock, not as the owning changeset's rollback kind.
    pub change_kind: ChangeKind,

    #[builder(default, setter(strip_option))]
    pub from_center_id: Option<CenterId>,
    #[builder(default, setter(strip_option))]
    pub to_center_id: Option<CenterId>,

    /// Whether the change was made
    pub changed: bool,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl ChangeRecord {
    /// Insert the record on the execution transaction.
    ///
    /// The `(changeset_id, citizen_id)` uniqueness constraint is the final
    /// guard against a citizen being changed twice in one run; a violation
    /// aborts the transaction and fails the changeset.
    pub async fn insert(&self, conn: &mut PgConnection) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO change_records (
                id, changeset_id, citizen_id, change_kind,
                from_center_id, to_center_id, changed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.changeset_id)
        .bind(self.citizen_id)
        .bind(self.change_kind)
        .bind(self.from_center_id)
        .bind(self.to_center_id)
        .bind(self.changed)
        .fetch_one(conn)
        .await
        .map_err(Into::into)
    }

    /// All records for a changeset, in stable reporting order.
    pub async fn for_changeset(changeset_id: ChangesetId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM change_records
            WHERE changeset_id = $1
            ORDER BY change_kind, citizen_id
            "#,
        )
        .bind(changeset_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// The record for one citizen within a changeset, if any.
    pub async fn find_for_citizen(
        changeset_id: ChangesetId,
        citizen_id: CitizenId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM change_records WHERE changeset_id = $1 AND citizen_id = $2",
        )
        .bind(changeset_id)
        .bind(citizen_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Records where a change was actually made, read on the execution
    /// transaction (the rollback engine replays these).
    pub async fn changed_records(
        changeset_id: ChangesetId,
        conn: &mut PgConnection,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM change_records
            WHERE changeset_id = $1 AND changed = TRUE
            ORDER BY change_kind, citizen_id
            "#,
        )
        .bind(changeset_id)
        .fetch_all(conn)
        .await
        .map_err(Into::into)
    }

    /// Whether any record written for this changeset has `changed = false`.
    ///
    /// Read on the execution transaction so records written in the current
    /// run are visible.
    pub async fn any_unchanged(changeset_id: ChangesetId, conn: &mut PgConnection) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM change_records
                WHERE changeset_id = $1 AND changed = FALSE
            )
            "#,
        )
        .bind(changeset_id)
        .fetch_one(conn)
        .await?;

        Ok(exists)
    }

    pub async fn count_changed(changeset_id: ChangesetId, pool: &PgPool) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM change_records WHERE changeset_id = $1 AND changed = TRUE",
        )
        .bind(changeset_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    pub async fn count_unchanged(changeset_id: ChangesetId, pool: &PgPool) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM change_records WHERE changeset_id = $1 AND changed = FALSE",
        )
        .bind(changeset_id)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
