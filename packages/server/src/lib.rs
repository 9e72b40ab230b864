// Voter Registry - Changeset Service Core
//
// This crate implements the approval-gated changeset workflow for bulk edits
// to voter registration data: moving registrations between centers, blocking
// and unblocking citizens, and rolling prior changesets back.
//
// Execution runs out-of-band on a background worker (see kernel/jobs).

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
