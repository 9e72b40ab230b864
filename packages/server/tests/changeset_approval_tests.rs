//! Integration tests for the changeset approval workflow.
//!
//! The configured quorum in tests is 2 distinct approvers.

mod common;

use test_context::test_context;

use common::{fixtures, TestHarness};
use registry_core::common::{Actor, UserId};
use registry_core::domains::changesets::actions::{approve_changeset, revoke_approval};
use registry_core::domains::changesets::models::{ChangeKind, ChangesetStatus, SelectionMode};
use registry_core::domains::changesets::ChangesetError;

#[test_context(TestHarness)]
#[tokio::test]
async fn approve_requires_permission(ctx: &TestHarness) {
    let (deps, _) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::New,
        &ctx.db_pool,
    )
    .await;

    let no_rights = Actor::new(UserId::new());
    let result = approve_changeset(changeset.id, &no_rights, &deps).await;

    assert!(matches!(result, Err(ChangesetError::PermissionDenied(_))));
    assert_eq!(changeset.approval_count(&ctx.db_pool).await.unwrap(), 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn approval_quorum_advances_status(ctx: &TestHarness) {
    let (deps, _) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::New,
        &ctx.db_pool,
    )
    .await;

    // First approval: below quorum, status unchanged
    let updated = approve_changeset(changeset.id, &fixtures::approver(), &deps)
        .await
        .unwrap();
    assert_eq!(updated.status, ChangesetStatus::New);
    assert_eq!(updated.approval_count(&ctx.db_pool).await.unwrap(), 1);

    // Second distinct approval reaches quorum
    let updated = approve_changeset(changeset.id, &fixtures::approver(), &deps)
        .await
        .unwrap();
    assert_eq!(updated.status, ChangesetStatus::Approved);
    assert_eq!(updated.approval_count(&ctx.db_pool).await.unwrap(), 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn approving_twice_is_idempotent(ctx: &TestHarness) {
    let (deps, _) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::New,
        &ctx.db_pool,
    )
    .await;

    let approver = fixtures::approver();
    approve_changeset(changeset.id, &approver, &deps)
        .await
        .unwrap();
    let updated = approve_changeset(changeset.id, &approver, &deps)
        .await
        .unwrap();

    // One approver entry, no quorum transition
    assert_eq!(updated.approval_count(&ctx.db_pool).await.unwrap(), 1);
    assert_eq!(updated.status, ChangesetStatus::New);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn approve_fails_once_queued(ctx: &TestHarness) {
    let (deps, _) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::Queued,
        &ctx.db_pool,
    )
    .await;

    let result = approve_changeset(changeset.id, &fixtures::approver(), &deps).await;
    assert!(matches!(result, Err(ChangesetError::NotInApprovableStatus)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn revoking_below_quorum_demotes_status(ctx: &TestHarness) {
    let (deps, _) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::New,
        &ctx.db_pool,
    )
    .await;

    let first = fixtures::approver();
    let second = fixtures::approver();
    approve_changeset(changeset.id, &first, &deps).await.unwrap();
    let approved = approve_changeset(changeset.id, &second, &deps)
        .await
        .unwrap();
    assert_eq!(approved.status, ChangesetStatus::Approved);

    let demoted = revoke_approval(changeset.id, &second, &deps).await.unwrap();
    assert_eq!(demoted.status, ChangesetStatus::New);
    assert_eq!(demoted.approval_count(&ctx.db_pool).await.unwrap(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn revoke_by_non_approver_fails(ctx: &TestHarness) {
    let (deps, _) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::New,
        &ctx.db_pool,
    )
    .await;

    let result = revoke_approval(changeset.id, &fixtures::approver(), &deps).await;
    assert!(matches!(result, Err(ChangesetError::NotApprovedBy)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn revoke_fails_once_queued(ctx: &TestHarness) {
    let (deps, _) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::Queued,
        &ctx.db_pool,
    )
    .await;

    let result = revoke_approval(changeset.id, &fixtures::approver(), &deps).await;
    assert!(matches!(result, Err(ChangesetError::NotInApprovableStatus)));
}
