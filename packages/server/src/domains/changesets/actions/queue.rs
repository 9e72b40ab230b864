//! Queue action: hand an approved changeset to the background dispatcher.

use tracing::{info, warn};

use crate::common::{Actor, ChangesetId, StaffCapability};
use crate::kernel::jobs::JobSpec;
use crate::kernel::ServerDeps;

use super::super::errors::ChangesetError;
use super::super::jobs::ExecuteChangesetCommand;
use super::super::models::{Changeset, ChangesetStatus};

/// Queue the changeset to be executed in the background.
///
/// The QUEUED status is committed before the job is submitted. If submission
/// itself fails, the status is reverted to APPROVED and the error surfaced,
/// so a dispatcher outage never leaves a changeset stuck in QUEUED with no
/// job behind it.
pub async fn queue_changeset(
    changeset_id: ChangesetId,
    actor: &Actor,
    deps: &ServerDeps,
) -> Result<Changeset, ChangesetError> {
    actor.require(StaffCapability::QueueChangesets)?;

    let changeset = Changeset::find_by_id(changeset_id, &deps.db_pool)
        .await?
        .ok_or(ChangesetError::NotFound)?;

    if !changeset.status.is_queueable() {
        return Err(ChangesetError::NotAnAllowedStatus(format!(
            "cannot queue changeset in status {}",
            changeset.status
        )));
    }

    let command = ExecuteChangesetCommand { changeset_id };
    let spec = JobSpec::for_command(&command).map_err(ChangesetError::Dispatch)?;

    Changeset::mark_queued(changeset_id, actor.user_id(), &deps.db_pool).await?;

    if let Err(e) = deps.job_queue.submit(spec).await {
        // Un-mark the changeset as queued: with no job behind it, QUEUED
        // would be a dead end.
        warn!(changeset = %changeset.name, error = %e, "job submission failed, reverting to approved");
        Changeset::update_status(changeset_id, ChangesetStatus::Approved, &deps.db_pool).await?;
        return Err(ChangesetError::Dispatch(e));
    }

    info!(changeset = %changeset.name, "changeset queued for execution");

    Changeset::find_by_id(changeset_id, &deps.db_pool)
        .await?
        .ok_or(ChangesetError::NotFound)
}
