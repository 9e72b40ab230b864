//! Authoring actions: create and delete changesets.
//!
//! The admin layer collects the inputs (including resolving uploaded
//! national-ID lists to citizens); this module enforces the structural
//! invariants before anything is persisted.

use tracing::info;

use crate::common::{Actor, CenterId, ChangesetId, CitizenId, StaffCapability};
use crate::kernel::ServerDeps;

use super::super::errors::ChangesetError;
use super::super::models::{ChangeKind, Changeset, ChangesetStatus, SelectionMode};

/// Inputs for a new changeset, as collected by the authoring layer.
#[derive(Debug, Clone)]
pub struct NewChangeset {
    pub name: String,
    pub change_kind: ChangeKind,
    pub selection_mode: SelectionMode,
    pub other_changeset_id: Option<ChangesetId>,
    pub target_center_id: Option<CenterId>,
    pub message: String,
    pub justification: String,
    /// Source centers, for by-centers selection
    pub source_centers: Vec<CenterId>,
    /// Uploaded citizen list, for by-uploaded-ids selection
    pub citizens: Vec<CitizenId>,
}

/// Validate the structural invariants of a changeset definition.
pub(crate) fn validate_definition(input: &NewChangeset) -> Result<(), ChangesetError> {
    if input.change_kind == ChangeKind::Rollback
        && input.selection_mode != SelectionMode::ByOtherChangeset
    {
        return Err(ChangesetError::Invalid(
            "rollbacks must select citizens from the changeset being rolled back".to_string(),
        ));
    }

    if input.selection_mode == SelectionMode::ByOtherChangeset
        && input.other_changeset_id.is_none()
    {
        return Err(ChangesetError::Invalid(
            "selection is by other changeset but no other changeset is attached".to_string(),
        ));
    }

    if input.change_kind == ChangeKind::MoveCenter {
        let target = input.target_center_id.ok_or_else(|| {
            ChangesetError::Invalid("center moves need a target center".to_string())
        })?;
        if input.selection_mode == SelectionMode::ByCenters
            && input.source_centers.contains(&target)
        {
            return Err(ChangesetError::Invalid(
                "target center cannot be one of the source centers".to_string(),
            ));
        }
    }

    Ok(())
}

/// Create a changeset in the NEW status.
pub async fn create_changeset(
    input: NewChangeset,
    actor: &Actor,
    deps: &ServerDeps,
) -> Result<Changeset, ChangesetError> {
    actor.require(StaffCapability::EditChangesets)?;
    validate_definition(&input)?;

    // A changeset can only reference another changeset once that one has
    // actually run.
    if let Some(other_id) = input.other_changeset_id {
        let other = Changeset::find_by_id(other_id, &deps.db_pool)
            .await?
            .ok_or(ChangesetError::NotFound)?;
        if !other.status.has_been_executed() {
            return Err(ChangesetError::Invalid(format!(
                "changeset {} has not been executed yet",
                other.name
            )));
        }
    }

    let changeset = Changeset {
        id: ChangesetId::new(),
        name: input.name,
        change_kind: input.change_kind,
        selection_mode: input.selection_mode,
        other_changeset_id: input.other_changeset_id,
        target_center_id: input.target_center_id,
        message: input.message,
        justification: input.justification,
        status: ChangesetStatus::New,
        execution_start_time: None,
        finish_time: None,
        queued_by: None,
        created_by: actor.user_id(),
        rollback_changeset_id: None,
        error_text: String::new(),
        deleted: false,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };

    let inserted = changeset.insert(&deps.db_pool).await?;
    inserted
        .add_selected_centers(&input.source_centers, &deps.db_pool)
        .await?;
    inserted
        .add_selected_citizens(&input.citizens, &deps.db_pool)
        .await?;

    info!(changeset = %inserted.name, kind = ?inserted.change_kind, "changeset created");

    Ok(inserted)
}

/// Soft-delete a changeset. Not allowed once it has been queued.
pub async fn delete_changeset(
    changeset_id: ChangesetId,
    actor: &Actor,
    deps: &ServerDeps,
) -> Result<(), ChangesetError> {
    actor.require(StaffCapability::DeleteChangesets)?;

    let changeset = Changeset::find_by_id(changeset_id, &deps.db_pool)
        .await?
        .ok_or(ChangesetError::NotFound)?;

    if !changeset.status.is_deletable() {
        return Err(ChangesetError::NotAnAllowedStatus(format!(
            "cannot delete changeset in status {}",
            changeset.status
        )));
    }

    Changeset::soft_delete(changeset_id, &deps.db_pool).await?;
    info!(changeset = %changeset.name, "changeset deleted");

    Ok(())
}
