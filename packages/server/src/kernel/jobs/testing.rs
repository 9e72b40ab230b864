//! Test doubles for the job queue.
//!
//! `SpyJobQueue` records submitted specs so tests can assert on dispatch
//! without running a worker. `FailingJobQueue` rejects every submit, for
//! exercising dispatcher-outage paths.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use uuid::Uuid;

use super::job::ErrorKind;
use super::queue::{ClaimedJob, EnqueueResult, JobQueue, JobSpec};

/// In-memory queue that records every submitted spec.
#[derive(Default)]
pub struct SpyJobQueue {
    submitted: Arc<Mutex<Vec<JobSpec>>>,
}

impl SpyJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// All specs submitted so far.
    pub fn submitted(&self) -> Vec<JobSpec> {
        self.submitted.lock().unwrap().clone()
    }

    /// Whether a job of the given type was submitted for the reference.
    pub fn was_submitted(&self, job_type: &str, reference_id: Uuid) -> bool {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.job_type == job_type && s.reference_id == reference_id)
    }
}

#[async_trait]
impl JobQueue for SpyJobQueue {
    async fn submit(&self, spec: JobSpec) -> Result<EnqueueResult> {
        let mut submitted = self.submitted.lock().unwrap();
        if let Some(key) = &spec.idempotency_key {
            if let Some(existing) = submitted
                .iter()
                .find(|s| s.idempotency_key.as_deref() == Some(key))
            {
                return Ok(EnqueueResult::Duplicate(existing.reference_id));
            }
        }
        let id = Uuid::now_v7();
        submitted.push(spec);
        Ok(EnqueueResult::Created(id))
    }

    async fn claim(&self, _worker_id: &str, _limit: i64) -> Result<Vec<ClaimedJob>> {
        Ok(Vec::new())
    }

    async fn mark_succeeded(&self, _job_id: Uuid) -> Result<()> {
        Ok(())
    }

    async fn mark_failed(&self, _job_id: Uuid, _error: &str, _kind: ErrorKind) -> Result<()> {
        Ok(())
    }
}

/// Queue whose submit always fails, simulating a dispatcher outage.
#[derive(Default)]
pub struct FailingJobQueue;

impl FailingJobQueue {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobQueue for FailingJobQueue {
    async fn submit(&self, _spec: JobSpec) -> Result<EnqueueResult> {
        Err(anyhow!("job queue unavailable"))
    }

    async fn claim(&self, _worker_id: &str, _limit: i64) -> Result<Vec<ClaimedJob>> {
        Err(anyhow!("job queue unavailable"))
    }

    async fn mark_succeeded(&self, _job_id: Uuid) -> Result<()> {
        Err(anyhow!("job queue unavailable"))
    }

    async fn mark_failed(&self, _job_id: Uuid, _error: &str, _kind: ErrorKind) -> Result<()> {
        Err(anyhow!("job queue unavailable"))
    }
}
