//! Selection resolver: computes which citizens and registrations a changeset
//! operates on, according to its selection mode.
//!
//! Selection runs on the execution transaction's connection so the set is
//! consistent with the mutations that follow.

use anyhow::{bail, Result};
use sqlx::PgConnection;

use crate::common::ChangesetId;
use crate::domains::registry::models::{Citizen, Registration};

use super::models::{Changeset, SelectionMode};

/// The citizens this changeset should change (or whose registrations it
/// should change).
///
/// - By centers: citizens holding a confirmed registration at any selected
///   source center. Registrations whose citizen is missing from the civil
///   registry are skipped.
/// - By uploaded IDs: the explicit citizen list attached at authoring time.
/// - By other changeset: citizens the other changeset actually changed
///   (its `changed = true` records), which is not necessarily the set its
///   selection rules would produce today.
pub async fn citizens_to_change(
    changeset: &Changeset,
    conn: &mut PgConnection,
) -> Result<Vec<Citizen>> {
    match changeset.selection_mode {
        SelectionMode::ByCenters => sqlx::query_as::<_, Citizen>(
            r#"
            SELECT c.* FROM citizens c
            JOIN registrations r ON r.citizen_id = c.id
                AND r.deleted = FALSE AND r.archive_time IS NULL
            WHERE c.missing IS NULL
              AND r.center_id IN (
                  SELECT center_id FROM changeset_centers WHERE changeset_id = $1
              )
            ORDER BY c.id
            "#,
        )
        .bind(changeset.id)
        .fetch_all(conn)
        .await
        .map_err(Into::into),

        SelectionMode::ByUploadedIds => sqlx::query_as::<_, Citizen>(
            r#"
            SELECT c.* FROM citizens c
            JOIN changeset_citizens cc ON cc.citizen_id = c.id
            WHERE cc.changeset_id = $1 AND c.missing IS NULL
            ORDER BY c.id
            "#,
        )
        .bind(changeset.id)
        .fetch_all(conn)
        .await
        .map_err(Into::into),

        SelectionMode::ByOtherChangeset => {
            let other = require_other_changeset(changeset)?;
            sqlx::query_as::<_, Citizen>(
                r#"
                SELECT c.* FROM citizens c
                JOIN change_records cr ON cr.citizen_id = c.id
                WHERE cr.changeset_id = $1 AND cr.changed = TRUE AND c.missing IS NULL
                ORDER BY c.id
                "#,
            )
            .bind(other)
            .fetch_all(conn)
            .await
            .map_err(Into::into)
        }
    }
}

/// The registrations this changeset should change.
///
/// For by-centers selection this is the confirmed registrations at the
/// source centers whose citizen still exists in the civil registry; a
/// registration with a missing citizen is silently left out, so a center
/// move can report success while such a registration keeps its old center.
/// For the other modes, it is the confirmed registrations of the selected
/// citizens.
pub async fn registrations_to_change(
    changeset: &Changeset,
    conn: &mut PgConnection,
) -> Result<Vec<Registration>> {
    match changeset.selection_mode {
        SelectionMode::ByCenters => sqlx::query_as::<_, Registration>(
            r#"
            SELECT r.* FROM registrations r
            JOIN citizens c ON c.id = r.citizen_id AND c.missing IS NULL
            WHERE r.deleted = FALSE AND r.archive_time IS NULL
              AND r.center_id IN (
                  SELECT center_id FROM changeset_centers WHERE changeset_id = $1
              )
            ORDER BY r.id
            "#,
        )
        .bind(changeset.id)
        .fetch_all(conn)
        .await
        .map_err(Into::into),

        SelectionMode::ByUploadedIds => sqlx::query_as::<_, Registration>(
            r#"
            SELECT r.* FROM registrations r
            JOIN changeset_citizens cc ON cc.citizen_id = r.citizen_id
            JOIN citizens c ON c.id = r.citizen_id AND c.missing IS NULL
            WHERE cc.changeset_id = $1
              AND r.deleted = FALSE AND r.archive_time IS NULL
            ORDER BY r.id
            "#,
        )
        .bind(changeset.id)
        .fetch_all(conn)
        .await
        .map_err(Into::into),

        SelectionMode::ByOtherChangeset => {
            let other = require_other_changeset(changeset)?;
            sqlx::query_as::<_, Registration>(
                r#"
                SELECT r.* FROM registrations r
                JOIN change_records cr ON cr.citizen_id = r.citizen_id
                JOIN citizens c ON c.id = r.citizen_id AND c.missing IS NULL
                WHERE cr.changeset_id = $1 AND cr.changed = TRUE
                  AND r.deleted = FALSE AND r.archive_time IS NULL
                ORDER BY r.id
                "#,
            )
            .bind(other)
            .fetch_all(conn)
            .await
            .map_err(Into::into)
        }
    }
}

fn require_other_changeset(changeset: &Changeset) -> Result<ChangesetId> {
    match changeset.other_changeset_id {
        Some(id) => Ok(id),
        None => bail!(
            "changeset {} selects by other changeset but has none attached",
            changeset.id
        ),
    }
}
