use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::CenterId;

/// Registration center model - SQL persistence layer
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RegistrationCenter {
    pub id: CenterId,
    pub name: String,
    /// Whether the center currently accepts new registrations
    pub reg_open: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl RegistrationCenter {
    pub async fn find_by_id(id: CenterId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM registration_centers WHERE id = $1 AND deleted = FALSE",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Insert new center
    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO registration_centers (id, name, reg_open, deleted)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(self.reg_open)
        .bind(self.deleted)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }
}
