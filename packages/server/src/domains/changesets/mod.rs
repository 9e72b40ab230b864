// Changesets domain: approval-gated, auditable, reversible bulk edits to
// registration data.
//
// A changeset is authored, approved by a quorum of distinct staff users,
// queued, and then executed asynchronously by the job worker. Execution
// writes one ChangeRecord per affected citizen inside a single transaction
// and derives the terminal status from the outcomes. A rollback changeset
// replays another changeset's ledger in reverse, skipping citizens whose
// state has diverged since.

pub mod actions;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod selection;

pub use errors::ChangesetError;
pub use models::{ChangeKind, ChangeRecord, Changeset, ChangesetStatus, SelectionMode};
