//! Typed ID aliases for the domain entities.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Citizen entities (civil registry records).
pub struct Citizen;

/// Marker type for RegistrationCenter entities.
pub struct RegistrationCenter;

/// Marker type for Registration entities (citizen ↔ center links).
pub struct Registration;

/// Marker type for Changeset entities.
pub struct Changeset;

/// Marker type for ChangeRecord entities (the execution ledger).
pub struct ChangeRecord;

/// Marker type for staff users (approvers, queuers, authors).
pub struct User;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

pub type CitizenId = Id<Citizen>;
pub type CenterId = Id<RegistrationCenter>;
pub type RegistrationId = Id<Registration>;
pub type ChangesetId = Id<Changeset>;
pub type ChangeRecordId = Id<ChangeRecord>;
pub type UserId = Id<User>;
