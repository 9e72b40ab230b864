/// Capabilities a staff user can hold over changesets.
///
/// These mirror the permission strings managed by the admin layer; one
/// capability per privileged changeset operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffCapability {
    /// Add or revoke an approval on a changeset
    ApproveChangesets,

    /// Queue an approved changeset for execution
    QueueChangesets,

    /// Create and edit changesets
    EditChangesets,

    /// Soft-delete changesets that have not been queued
    DeleteChangesets,

    /// Read and list changesets and their change records
    BrowseChangesets,
}
