//! Factories for test data.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use registry_core::common::{
    Actor, CenterId, ChangesetId, CitizenId, StaffCapability, UserId,
};
use registry_core::domains::changesets::models::{
    ChangeKind, ChangeRecord, Changeset, ChangesetStatus, SelectionMode,
};
use registry_core::domains::registry::models::{Citizen, Registration, RegistrationCenter};

static NEXT_NATIONAL_ID: AtomicI64 = AtomicI64::new(100_000_000_000);

fn next_national_id() -> i64 {
    NEXT_NATIONAL_ID.fetch_add(1, Ordering::SeqCst)
}

/// Unique name so fixtures can share one database.
pub fn unique_name(prefix: &str) -> String {
    format!("{} {}", prefix, Uuid::now_v7())
}

pub async fn create_citizen(pool: &PgPool) -> Citizen {
    let national_id = next_national_id();
    Citizen {
        id: CitizenId::new(),
        national_id,
        name: format!("Citizen {national_id}"),
        blocked: false,
        missing: None,
        created_at: Utc::now(),
    }
    .insert(pool)
    .await
    .expect("Failed to create citizen")
}

pub async fn create_blocked_citizen(pool: &PgPool) -> Citizen {
    let citizen = create_citizen(pool).await;
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Citizen::block(citizen.id, &mut conn)
        .await
        .expect("Failed to block citizen");
    Citizen::reload(citizen.id, pool)
        .await
        .expect("Failed to reload citizen")
}

pub async fn create_center(pool: &PgPool) -> RegistrationCenter {
    RegistrationCenter {
        id: CenterId::new(),
        name: unique_name("Center"),
        reg_open: true,
        deleted: false,
        created_at: Utc::now(),
    }
    .insert(pool)
    .await
    .expect("Failed to create center")
}

pub async fn create_registration(
    citizen: &Citizen,
    center: &RegistrationCenter,
    pool: &PgPool,
) -> Registration {
    Registration {
        id: registry_core::common::RegistrationId::new(),
        citizen_id: citizen.id,
        center_id: center.id,
        deleted: false,
        archive_time: None,
        created_at: Utc::now(),
    }
    .insert(pool)
    .await
    .expect("Failed to create registration")
}

/// Insert a changeset directly in the given status.
pub async fn create_changeset(
    change_kind: ChangeKind,
    selection_mode: SelectionMode,
    status: ChangesetStatus,
    pool: &PgPool,
) -> Changeset {
    Changeset::builder()
        .name(unique_name("Changeset"))
        .change_kind(change_kind)
        .selection_mode(selection_mode)
        .status(status)
        .justification("integration test")
        .created_by(UserId::new())
        .build()
        .insert(pool)
        .await
        .expect("Failed to create changeset")
}

/// Insert a rollback changeset targeting `other`.
pub async fn create_rollback_changeset(
    other: ChangesetId,
    status: ChangesetStatus,
    pool: &PgPool,
) -> Changeset {
    Changeset::builder()
        .name(unique_name("Rollback"))
        .change_kind(ChangeKind::Rollback)
        .selection_mode(SelectionMode::ByOtherChangeset)
        .other_changeset_id(other)
        .status(status)
        .justification("integration test")
        .created_by(UserId::new())
        .build()
        .insert(pool)
        .await
        .expect("Failed to create rollback changeset")
}

/// Insert a ledger record directly (for by-other-changeset fixtures).
pub async fn create_change_record(
    changeset: ChangesetId,
    citizen: CitizenId,
    change_kind: ChangeKind,
    changed: bool,
    pool: &PgPool,
) -> ChangeRecord {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    ChangeRecord::builder()
        .changeset_id(changeset)
        .citizen_id(citizen)
        .change_kind(change_kind)
        .changed(changed)
        .build()
        .insert(&mut conn)
        .await
        .expect("Failed to create change record")
}

pub fn approver() -> Actor {
    Actor::with_capabilities(UserId::new(), [StaffCapability::ApproveChangesets])
}

pub fn queuer() -> Actor {
    Actor::with_capabilities(UserId::new(), [StaffCapability::QueueChangesets])
}

pub fn author() -> Actor {
    Actor::with_capabilities(
        UserId::new(),
        [
            StaffCapability::EditChangesets,
            StaffCapability::DeleteChangesets,
        ],
    )
}
