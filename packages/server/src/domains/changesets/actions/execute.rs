//! Execution engine: applies a changeset's changes inside one transaction.
//!
//! Called exactly once per changeset by the background job. The status
//! transition into EXECUTING is an atomic conditional update, so a worker
//! racing on a stale status read is rejected instead of double-executing.
//!
//! Every selected citizen gets exactly one ChangeRecord stating whether they
//! were changed. If any record has `changed = false` the run ends
//! PARTIALLY_SUCCESSFUL, otherwise SUCCESSFUL. Any error inside the
//! transaction discards all of the run's writes and the changeset is
//! independently persisted as FAILED with the captured error text.

use anyhow::{bail, Context, Result};
use sqlx::PgConnection;
use tracing::{error, info};

use crate::common::ChangesetId;
use crate::domains::registry::models::{Citizen, Registration};
use crate::kernel::ServerDeps;

use super::super::errors::ChangesetError;
use super::super::models::{ChangeKind, ChangeRecord, Changeset, ChangesetStatus};
use super::super::selection;

/// Execute the changeset.
///
/// Status preconditions are raised to the caller; failures while applying
/// the changes are converted into a terminal FAILED status and logged, not
/// raised past the job boundary.
pub async fn execute_changeset(
    changeset_id: ChangesetId,
    deps: &ServerDeps,
) -> Result<Changeset, ChangesetError> {
    let pool = &deps.db_pool;

    let changeset = Changeset::find_by_id(changeset_id, pool)
        .await?
        .ok_or(ChangesetError::NotFound)?;

    info!(changeset = %changeset.name, "executing changeset");

    if !changeset.status.is_executable() {
        return Err(ChangesetError::NotAnAllowedStatus(format!(
            "cannot execute changeset in status {}",
            changeset.status
        )));
    }

    if changeset.change_kind == ChangeKind::Rollback {
        // Can only roll back a successful or partially successful changeset
        let other_id = changeset.other_changeset_id.ok_or_else(|| {
            ChangesetError::Invalid("rollback changeset has no target attached".to_string())
        })?;
        let other = Changeset::find_by_id(other_id, pool)
            .await?
            .ok_or(ChangesetError::NotFound)?;
        if !other.status.is_rollbackable() {
            return Err(ChangesetError::NotAnAllowedStatus(format!(
                "cannot roll back changeset in status {}",
                other.status
            )));
        }
    }

    // Claim the changeset with a conditional update so concurrent observers
    // see progress and a second worker cannot start from a stale read.
    let changeset = Changeset::claim_for_execution(changeset_id, pool)
        .await?
        .ok_or_else(|| {
            ChangesetError::NotAnAllowedStatus(
                "changeset was claimed by another execution".to_string(),
            )
        })?;

    match apply_changes(&changeset, deps).await {
        Ok(status) => {
            info!(changeset = %changeset.name, status = %status, "changeset execution finished");
        }
        Err(e) => {
            // The transaction has been discarded; record the failure on the
            // changeset row itself.
            error!(changeset = %changeset.name, error = %e, "changeset execution failed");
            Changeset::mark_failed(changeset_id, &format!("{e:#}"), pool).await?;
        }
    }

    Changeset::find_by_id(changeset_id, pool)
        .await?
        .ok_or(ChangesetError::NotFound)
}

/// Run the whole mutation inside one transaction and derive the terminal
/// status. Returns the status on commit; any error leaves nothing behind.
async fn apply_changes(changeset: &Changeset, deps: &ServerDeps) -> Result<ChangesetStatus> {
    let mut tx = deps.db_pool.begin().await?;

    match changeset.change_kind {
        ChangeKind::MoveCenter => apply_center_move(changeset, &mut *tx).await?,
        ChangeKind::Block | ChangeKind::Unblock => apply_block_change(changeset, &mut *tx).await?,
        ChangeKind::Rollback => apply_rollback(changeset, &mut *tx).await?,
    }

    let status = if ChangeRecord::any_unchanged(changeset.id, &mut *tx).await? {
        ChangesetStatus::PartiallySuccessful
    } else {
        ChangesetStatus::Successful
    };

    Changeset::finish(changeset.id, status, &mut *tx).await?;
    tx.commit().await?;

    Ok(status)
}

/// Move every selected registration to the target center, archiving the
/// superseded version. A registration already at the target (possible with
/// an uploaded list when the citizen later re-registered themselves) is
/// recorded as unchanged.
async fn apply_center_move(changeset: &Changeset, conn: &mut PgConnection) -> Result<()> {
    let target = changeset
        .target_center_id
        .context("center move changeset has no target center")?;

    for reg in selection::registrations_to_change(changeset, &mut *conn).await? {
        let record = ChangeRecord::builder()
            .changeset_id(changeset.id)
            .citizen_id(reg.citizen_id)
            .change_kind(ChangeKind::MoveCenter)
            .from_center_id(reg.center_id)
            .to_center_id(target);

        if reg.center_id == target {
            record.changed(false).build().insert(&mut *conn).await?;
        } else {
            Registration::move_to_center_with_archive(reg.id, target, &mut *conn).await?;
            record.changed(true).build().insert(&mut *conn).await?;
        }
    }

    Ok(())
}

/// Block or unblock every selected citizen. A citizen already in the desired
/// state is recorded as unchanged.
async fn apply_block_change(changeset: &Changeset, conn: &mut PgConnection) -> Result<()> {
    for citizen in selection::citizens_to_change(changeset, &mut *conn).await? {
        let record = ChangeRecord::builder()
            .changeset_id(changeset.id)
            .citizen_id(citizen.id)
            .change_kind(changeset.change_kind);

        let changed = match changeset.change_kind {
            ChangeKind::Block if !citizen.blocked => {
                Citizen::block(citizen.id, &mut *conn).await?;
                true
            }
            ChangeKind::Unblock if citizen.blocked => {
                Citizen::unblock(citizen.id, &mut *conn).await?;
                true
            }
            _ => false,
        };

        record.changed(changed).build().insert(&mut *conn).await?;
    }

    Ok(())
}

/// Undo the changes made in another changeset, where possible, and mark it
/// rolled back.
async fn apply_rollback(changeset: &Changeset, conn: &mut PgConnection) -> Result<()> {
    let other_id = changeset
        .other_changeset_id
        .context("rollback changeset has no target attached")?;

    for record in ChangeRecord::changed_records(other_id, &mut *conn).await? {
        undo(&record, changeset, &mut *conn).await?;
    }

    Changeset::mark_rolled_back(other_id, changeset.id, &mut *conn).await?;

    Ok(())
}

/// As part of `rollback`, try to undo one applied change, writing a new
/// ChangeRecord under `rollback` either way.
///
/// Each undo only proceeds while the citizen's current state still matches
/// what the original change left behind; a citizen who has diverged since
/// (re-registered, been unblocked independently, ...) is left untouched and
/// recorded as unchanged.
async fn undo(
    record: &ChangeRecord,
    rollback: &Changeset,
    conn: &mut PgConnection,
) -> Result<()> {
    // Programming invariants: never undo within the originating changeset,
    // never undo a change that was not made.
    assert_ne!(record.changeset_id, rollback.id);
    assert!(record.changed);

    let undo_record = ChangeRecord::builder()
        .changeset_id(rollback.id)
        .citizen_id(record.citizen_id);

    match record.change_kind {
        ChangeKind::MoveCenter => {
            let from = record
                .from_center_id
                .context("center move record has no from-center")?;
            let to = record
                .to_center_id
                .context("center move record has no to-center")?;

            // Only undo while the citizen still holds a confirmed
            // registration at the center the original change moved them to.
            let changed =
                match Registration::confirmed_at_center(record.citizen_id, to, &mut *conn).await? {
                    Some(current) => {
                        Registration::move_to_center_with_archive(current.id, from, &mut *conn)
                            .await?;
                        true
                    }
                    None => false,
                };

            undo_record
                .change_kind(ChangeKind::MoveCenter)
                .from_center_id(to)
                .to_center_id(from)
                .changed(changed)
                .build()
                .insert(&mut *conn)
                .await?;
        }
        ChangeKind::Block => {
            // Are they still blocked?
            let changed = if Citizen::is_blocked(record.citizen_id, &mut *conn).await? {
                Citizen::unblock(record.citizen_id, &mut *conn).await?;
                true
            } else {
                false
            };

            undo_record
                .change_kind(ChangeKind::Unblock)
                .changed(changed)
                .build()
                .insert(&mut *conn)
                .await?;
        }
        ChangeKind::Unblock => {
            // Are they still unblocked?
            let changed = if !Citizen::is_blocked(record.citizen_id, &mut *conn).await? {
                Citizen::block(record.citizen_id, &mut *conn).await?;
                true
            } else {
                false
            };

            undo_record
                .change_kind(ChangeKind::Block)
                .changed(changed)
                .build()
                .insert(&mut *conn)
                .await?;
        }
        ChangeKind::Rollback => {
            bail!("don't know how to undo a rollback change record");
        }
    }

    Ok(())
}
