use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::common::CitizenId;

/// Citizen model - SQL persistence layer
///
/// Mirrors the civil registry feed. `missing` is set when the citizen has
/// disappeared from the feed; default lookups exclude missing citizens.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Citizen {
    pub id: CitizenId,
    pub national_id: i64,
    pub name: String,
    pub blocked: bool,
    pub missing: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Citizen {
    /// Find a citizen by ID. Missing citizens are not returned.
    pub async fn find_by_id(id: CitizenId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM citizens WHERE id = $1 AND missing IS NULL")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Insert new citizen
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO citizens (id, national_id, name, blocked, missing)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.national_id)
        .bind(&self.name)
        .bind(self.blocked)
        .bind(self.missing)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Block a citizen from registering and voting.
    ///
    /// Also soft-deletes any current registrations, so blocking prevents
    /// voting even if the citizen was already registered.
    pub async fn block(id: CitizenId, conn: &mut PgConnection) -> Result<()> {
        sqlx::query("UPDATE citizens SET blocked = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        sqlx::query(
            r#"
            UPDATE registrations
            SET deleted = TRUE
            WHERE citizen_id = $1 AND deleted = FALSE AND archive_time IS NULL
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// The citizen's current blocked state, read on the given connection.
    pub async fn is_blocked(id: CitizenId, conn: &mut PgConnection) -> Result<bool> {
        let (blocked,): (bool,) = sqlx::query_as("SELECT blocked FROM citizens WHERE id = $1")
            .bind(id)
            .fetch_one(conn)
            .await?;

        Ok(blocked)
    }

    /// Clear a citizen's blocked flag.
    pub async fn unblock(id: CitizenId, conn: &mut PgConnection) -> Result<()> {
        sqlx::query("UPDATE citizens SET blocked = FALSE WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(())
    }

    /// Mark a citizen as absent from the civil registry feed.
    pub async fn mark_missing(id: CitizenId, pool: &PgPool) -> Result<()> {
        sqlx::query("UPDATE citizens SET missing = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Reload this citizen's current row, including the missing marker.
    pub async fn reload(id: CitizenId, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>("SELECT * FROM citizens WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await
            .map_err(Into::into)
    }
}
