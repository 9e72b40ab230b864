//! Job infrastructure for background command execution.
//!
//! This module provides the kernel-level plumbing for asynchronous work:
//! - [`PostgresJobQueue`] - database-backed job queue
//! - [`JobRegistry`] - maps job type strings to domain handlers
//! - [`JobRunner`] - long-running service that claims and executes jobs
//! - [`Job`] - the persisted job row
//!
//! # Architecture
//!
//! ```text
//! Action calls job_queue.submit(JobSpec::for_command(&cmd)?)
//!     │
//!     └─► Insert job row (idempotency key suppresses duplicates)
//!
//! JobRunner
//!     │
//!     ├─► Claim ready jobs (FOR UPDATE SKIP LOCKED)
//!     ├─► Execute via JobRegistry (deserialize + call handler)
//!     └─► Mark succeeded/failed
//! ```
//!
//! Background commands and their handlers live in their respective domains;
//! this module only provides the infrastructure.

mod job;
mod queue;
mod registry;
mod runner;
pub mod testing;

pub use job::{ErrorKind, Job, JobStatus};
pub use queue::{ClaimedJob, CommandMeta, EnqueueResult, JobQueue, JobSpec, PostgresJobQueue};
pub use registry::{JobRegistry, SharedJobRegistry};
pub use runner::{JobRunner, JobRunnerConfig};
