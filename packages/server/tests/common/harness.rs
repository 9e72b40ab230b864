//! Test harness with testcontainers for integration testing.
//!
//! Uses a shared Postgres container across all tests for dramatically
//! improved performance. The container and migrations are initialized once
//! on first use, then reused.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

use registry_core::config::Config;
use registry_core::kernel::jobs::testing::{FailingJobQueue, SpyJobQueue};
use registry_core::kernel::jobs::{JobQueue, PostgresJobQueue};
use registry_core::kernel::ServerDeps;

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Respect RUST_LOG in test output; try_init avoids double-init panics.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Test harness that manages test infrastructure.
///
/// Each test gets a fresh pool against the shared database container.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let (deps, _spy) = ctx.deps_with_spy_queue();
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    /// Database pool - use this for test fixtures.
    pub db_pool: PgPool,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        // Database pool is automatically dropped
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;

        Ok(Self { db_pool })
    }

    fn config(&self) -> Config {
        Config::for_database("postgres://test")
    }

    /// Deps with a spy queue that records submissions without executing.
    pub fn deps_with_spy_queue(&self) -> (Arc<ServerDeps>, Arc<SpyJobQueue>) {
        let spy = Arc::new(SpyJobQueue::new());
        let deps = Arc::new(ServerDeps::new(
            self.db_pool.clone(),
            spy.clone() as Arc<dyn JobQueue>,
            self.config(),
        ));
        (deps, spy)
    }

    /// Deps with a queue whose submissions always fail.
    pub fn deps_with_failing_queue(&self) -> Arc<ServerDeps> {
        Arc::new(ServerDeps::new(
            self.db_pool.clone(),
            Arc::new(FailingJobQueue::new()) as Arc<dyn JobQueue>,
            self.config(),
        ))
    }

    /// Deps backed by the real Postgres job queue.
    pub fn deps_with_postgres_queue(&self) -> (Arc<ServerDeps>, Arc<PostgresJobQueue>) {
        let queue = Arc::new(PostgresJobQueue::new(self.db_pool.clone()));
        let deps = Arc::new(ServerDeps::new(
            self.db_pool.clone(),
            queue.clone() as Arc<dyn JobQueue>,
            self.config(),
        ));
        (deps, queue)
    }
}
