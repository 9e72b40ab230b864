//! Job registry for deserializing and executing jobs.
//!
//! The registry maps job type strings (e.g. "execute_changeset") to handlers
//! that reconstruct the typed command from JSON and run the domain logic.
//! The JobRunner claims jobs from the database and dispatches them here
//! without knowing any concrete command types.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;

use super::queue::{ClaimedJob, CommandMeta};
use crate::kernel::ServerDeps;

/// Type alias for the async handler function.
type BoxedHandler = Box<
    dyn Fn(serde_json::Value, Arc<ServerDeps>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Registry that maps job type strings to handlers.
///
/// Each domain registers its job types at startup:
///
/// ```ignore
/// let mut registry = JobRegistry::new();
/// registry.register::<ExecuteChangesetCommand, _, _>(
///     "execute_changeset",
///     |cmd, deps| async move { run_changeset_job(cmd, &deps).await },
/// );
/// ```
#[derive(Default)]
pub struct JobRegistry {
    registrations: HashMap<&'static str, BoxedHandler>,
}

impl JobRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            registrations: HashMap::new(),
        }
    }

    /// Register a job type with its handler.
    pub fn register<C, F, Fut>(&mut self, job_type: &'static str, handler: F)
    where
        C: CommandMeta + DeserializeOwned + Send + Sync + 'static,
        F: Fn(C, Arc<ServerDeps>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler = Box::new(move |value, deps| {
            let handler = handler.clone();
            Box::pin(async move {
                let command: C = serde_json::from_value(value)
                    .map_err(|e| anyhow!("failed to deserialize {}: {}", job_type, e))?;
                handler(command, deps).await
            })
        });

        self.registrations.insert(job_type, boxed);
    }

    /// Execute a claimed job using its registered handler.
    ///
    /// Returns an error if the job type is not registered, the payload does
    /// not deserialize, or the handler itself fails.
    pub async fn execute(&self, job: &ClaimedJob, deps: Arc<ServerDeps>) -> Result<()> {
        let job_type = job.command_type();
        let handler = self
            .registrations
            .get(job_type)
            .ok_or_else(|| anyhow!("unknown job type: {}", job_type))?;

        let args = job
            .job
            .args
            .clone()
            .ok_or_else(|| anyhow!("job {} has no args", job.id))?;

        handler(args, deps).await
    }

    /// Check if a job type is registered.
    pub fn is_registered(&self, job_type: &str) -> bool {
        self.registrations.contains_key(job_type)
    }
}

/// Thread-safe registry wrapped in Arc.
pub type SharedJobRegistry = Arc<JobRegistry>;
