use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::common::{CenterId, CitizenId, RegistrationId};

/// Registration model - SQL persistence layer
///
/// Links a citizen to a registration center. A citizen has at most one
/// confirmed registration (`deleted = false`, `archive_time IS NULL`);
/// superseded versions are kept with `archive_time` set.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Registration {
    pub id: RegistrationId,
    pub citizen_id: CitizenId,
    pub center_id: CenterId,
    pub deleted: bool,
    pub archive_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Registration {
    /// Insert new registration
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO registrations (id, citizen_id, center_id, deleted, archive_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.citizen_id)
        .bind(self.center_id)
        .bind(self.deleted)
        .bind(self.archive_time)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_id(id: RegistrationId, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM registrations WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }

    /// The citizen's confirmed registration, if any.
    pub async fn confirmed_for_citizen(
        citizen_id: CitizenId,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM registrations
            WHERE citizen_id = $1 AND deleted = FALSE AND archive_time IS NULL
            "#,
        )
        .bind(citizen_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// The citizen's confirmed registration at a specific center, if any.
    ///
    /// Used by the rollback guard: a move is only undone while the citizen
    /// still holds a confirmed registration at the center the original
    /// change moved them to.
    pub async fn confirmed_at_center(
        citizen_id: CitizenId,
        center_id: CenterId,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM registrations
            WHERE citizen_id = $1 AND center_id = $2
              AND deleted = FALSE AND archive_time IS NULL
            "#,
        )
        .bind(citizen_id)
        .bind(center_id)
        .fetch_optional(conn)
        .await
        .map_err(Into::into)
    }

    /// Archived (superseded) versions for a citizen, oldest first.
    pub async fn archived_for_citizen(citizen_id: CitizenId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM registrations
            WHERE citizen_id = $1 AND archive_time IS NOT NULL
            ORDER BY archive_time
            "#,
        )
        .bind(citizen_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Rewrite this registration's center, archiving the current version.
    ///
    /// A copy of the row as it stands is inserted with `archive_time = NOW()`,
    /// then the live row is updated in place so its validity starts where the
    /// archived version's ended.
    pub async fn move_to_center_with_archive(
        id: RegistrationId,
        new_center: CenterId,
        conn: &mut PgConnection,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO registrations (id, citizen_id, center_id, deleted, archive_time, created_at)
            SELECT $2, citizen_id, center_id, deleted, NOW(), created_at
            FROM registrations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(Uuid::now_v7())
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            UPDATE registrations
            SET center_id = $2, created_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_center)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
