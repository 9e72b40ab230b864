//! Integration tests for queueing changesets and dispatching their jobs.

mod common;

use test_context::test_context;

use common::{fixtures, TestHarness};
use registry_core::common::{Actor, UserId};
use registry_core::domains::changesets::actions::queue_changeset;
use registry_core::domains::changesets::jobs::{self, EXECUTE_CHANGESET_JOB};
use registry_core::domains::changesets::models::{
    ChangeKind, ChangeRecord, Changeset, ChangesetStatus, SelectionMode,
};
use registry_core::domains::changesets::ChangesetError;
use registry_core::kernel::jobs::{JobQueue, JobRegistry};

#[test_context(TestHarness)]
#[tokio::test]
async fn queue_submits_execution_job(ctx: &TestHarness) {
    let (deps, spy) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::Approved,
        &ctx.db_pool,
    )
    .await;

    let queuer = fixtures::queuer();
    let updated = queue_changeset(changeset.id, &queuer, &deps).await.unwrap();

    assert_eq!(updated.status, ChangesetStatus::Queued);
    assert_eq!(updated.queued_by, Some(queuer.user_id()));
    assert!(spy.was_submitted(EXECUTE_CHANGESET_JOB, changeset.id.into_uuid()));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn queue_requires_permission(ctx: &TestHarness) {
    let (deps, spy) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::Approved,
        &ctx.db_pool,
    )
    .await;

    let result = queue_changeset(changeset.id, &Actor::new(UserId::new()), &deps).await;

    assert!(matches!(result, Err(ChangesetError::PermissionDenied(_))));
    assert!(spy.submitted().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn queue_from_new_status_fails(ctx: &TestHarness) {
    let (deps, spy) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::New,
        &ctx.db_pool,
    )
    .await;

    let result = queue_changeset(changeset.id, &fixtures::queuer(), &deps).await;

    assert!(matches!(result, Err(ChangesetError::NotAnAllowedStatus(_))));
    assert!(spy.submitted().is_empty());

    let unchanged = Changeset::find_by_id(changeset.id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.status, ChangesetStatus::New);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn queue_twice_fails_second_time(ctx: &TestHarness) {
    let (deps, _) = ctx.deps_with_spy_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::Approved,
        &ctx.db_pool,
    )
    .await;

    queue_changeset(changeset.id, &fixtures::queuer(), &deps)
        .await
        .unwrap();
    let result = queue_changeset(changeset.id, &fixtures::queuer(), &deps).await;

    assert!(matches!(result, Err(ChangesetError::NotAnAllowedStatus(_))));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn dispatch_failure_reverts_status(ctx: &TestHarness) {
    let deps = ctx.deps_with_failing_queue();
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::Approved,
        &ctx.db_pool,
    )
    .await;

    let result = queue_changeset(changeset.id, &fixtures::queuer(), &deps).await;
    assert!(matches!(result, Err(ChangesetError::Dispatch(_))));

    // The changeset must not be stuck in QUEUED with no job behind it
    let reverted = Changeset::find_by_id(changeset.id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reverted.status, ChangesetStatus::Approved);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn queued_job_runs_through_postgres_queue(ctx: &TestHarness) {
    let (deps, queue) = ctx.deps_with_postgres_queue();

    let citizen = fixtures::create_citizen(&ctx.db_pool).await;
    let changeset = fixtures::create_changeset(
        ChangeKind::Block,
        SelectionMode::ByUploadedIds,
        ChangesetStatus::Approved,
        &ctx.db_pool,
    )
    .await;
    changeset
        .add_selected_citizens(&[citizen.id], &ctx.db_pool)
        .await
        .unwrap();

    queue_changeset(changeset.id, &fixtures::queuer(), &deps)
        .await
        .unwrap();

    // Drive the worker loop by hand: claim, execute via the registry, mark.
    let mut registry = JobRegistry::new();
    jobs::register_jobs(&mut registry);

    let claimed = queue.claim("test-worker", 10).await.unwrap();
    let job = claimed
        .iter()
        .find(|j| j.job.reference_id == changeset.id.into_uuid())
        .expect("execution job not claimed");

    registry.execute(job, deps.clone()).await.unwrap();
    queue.mark_succeeded(job.id).await.unwrap();

    let executed = Changeset::find_by_id(changeset.id, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(executed.status, ChangesetStatus::Successful);

    let record = ChangeRecord::find_for_citizen(changeset.id, citizen.id, &ctx.db_pool)
        .await
        .unwrap()
        .expect("no change record written");
    assert!(record.changed);
}
