use thiserror::Error;

use crate::common::AuthError;

/// Errors raised by changeset operations.
///
/// The approval/queue errors are surfaced synchronously to the operator and
/// never retried. Failures inside the execution transaction are not raised
/// past the job boundary; they are captured on the changeset itself as a
/// FAILED status with error text.
#[derive(Error, Debug)]
pub enum ChangesetError {
    #[error(transparent)]
    PermissionDenied(#[from] AuthError),

    #[error("changeset has been queued and can no longer be approved or edited")]
    NotInApprovableStatus,

    #[error("user has not approved this changeset")]
    NotApprovedBy,

    #[error("changeset is not in an allowed status: {0}")]
    NotAnAllowedStatus(String),

    #[error("changeset not found")]
    NotFound,

    #[error("invalid changeset: {0}")]
    Invalid(String),

    #[error("failed to dispatch changeset job: {0}")]
    Dispatch(anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
