//! Changeset workflow actions.
//!
//! Approval, queueing, and execution logic over the changeset models. The
//! web/admin layer calls into these; the execution action is also invoked by
//! the background job handler.

pub mod approval;
pub mod authoring;
pub mod execute;
pub mod queue;

pub use approval::{approve_changeset, revoke_approval};
pub use authoring::{create_changeset, delete_changeset, NewChangeset};
pub use execute::execute_changeset;
pub use queue::queue_changeset;
