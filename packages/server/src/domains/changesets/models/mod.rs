pub mod change_record;
pub mod changeset;

pub use change_record::ChangeRecord;
pub use changeset::{ChangeKind, Changeset, ChangesetStatus, SelectionMode};
