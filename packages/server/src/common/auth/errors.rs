use thiserror::Error;

/// Authorization errors for changeset operations
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}
