//! Approve / revoke-approval actions.
//!
//! A changeset needs a configured minimum of distinct approvers before it
//! can be queued. Approvals can be added and withdrawn freely until the
//! changeset is queued; after that the approval set is frozen.

use tracing::info;

use crate::common::{Actor, ChangesetId, StaffCapability};
use crate::kernel::ServerDeps;

use super::super::errors::ChangesetError;
use super::super::models::{Changeset, ChangesetStatus};

/// Add `actor`'s approval to the changeset.
///
/// Approving twice is a no-op. Reaching the minimum number of distinct
/// approvers advances a NEW changeset to APPROVED.
pub async fn approve_changeset(
    changeset_id: ChangesetId,
    actor: &Actor,
    deps: &ServerDeps,
) -> Result<Changeset, ChangesetError> {
    actor.require(StaffCapability::ApproveChangesets)?;

    let changeset = Changeset::find_by_id(changeset_id, &deps.db_pool)
        .await?
        .ok_or(ChangesetError::NotFound)?;

    if !changeset.status.is_approvable() {
        return Err(ChangesetError::NotInApprovableStatus);
    }

    changeset.add_approver(actor.user_id(), &deps.db_pool).await?;

    let approvals = changeset.approval_count(&deps.db_pool).await?;
    if changeset.status == ChangesetStatus::New
        && approvals >= i64::from(deps.minimum_changeset_approvals())
    {
        info!(
            changeset = %changeset.name,
            approvals,
            "changeset reached approval quorum"
        );
        Changeset::update_status(changeset_id, ChangesetStatus::Approved, &deps.db_pool).await?;
    }

    Changeset::find_by_id(changeset_id, &deps.db_pool)
        .await?
        .ok_or(ChangesetError::NotFound)
}

/// Withdraw `actor`'s approval from the changeset.
///
/// Dropping below the minimum number of approvers demotes an APPROVED
/// changeset back to NEW. Fails if the actor never approved.
pub async fn revoke_approval(
    changeset_id: ChangesetId,
    actor: &Actor,
    deps: &ServerDeps,
) -> Result<Changeset, ChangesetError> {
    let changeset = Changeset::find_by_id(changeset_id, &deps.db_pool)
        .await?
        .ok_or(ChangesetError::NotFound)?;

    if !changeset.status.is_approvable() {
        return Err(ChangesetError::NotInApprovableStatus);
    }

    let removed = changeset
        .remove_approver(actor.user_id(), &deps.db_pool)
        .await?;
    if !removed {
        return Err(ChangesetError::NotApprovedBy);
    }

    let approvals = changeset.approval_count(&deps.db_pool).await?;
    if changeset.status == ChangesetStatus::Approved
        && approvals < i64::from(deps.minimum_changeset_approvals())
    {
        info!(
            changeset = %changeset.name,
            approvals,
            "changeset dropped below approval quorum"
        );
        Changeset::update_status(changeset_id, ChangesetStatus::New, &deps.db_pool).await?;
    }

    Changeset::find_by_id(changeset_id, &deps.db_pool)
        .await?
        .ok_or(ChangesetError::NotFound)
}
