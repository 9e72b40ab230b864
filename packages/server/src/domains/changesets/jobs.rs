//! Background job glue for changeset execution.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::common::ChangesetId;
use crate::kernel::jobs::{CommandMeta, JobRegistry};
use crate::kernel::ServerDeps;

use super::actions::execute_changeset;
use super::models::Changeset;

pub const EXECUTE_CHANGESET_JOB: &str = "execute_changeset";

/// Command submitted by `queue_changeset` and executed by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteChangesetCommand {
    pub changeset_id: ChangesetId,
}

impl CommandMeta for ExecuteChangesetCommand {
    fn command_type(&self) -> &'static str {
        EXECUTE_CHANGESET_JOB
    }

    fn reference_id(&self) -> Uuid {
        self.changeset_id.into_uuid()
    }

    fn idempotency_key(&self) -> Option<String> {
        Some(format!("{}:{}", EXECUTE_CHANGESET_JOB, self.changeset_id))
    }
}

/// Register this domain's job handlers.
pub fn register_jobs(registry: &mut JobRegistry) {
    registry.register::<ExecuteChangesetCommand, _, _>(
        EXECUTE_CHANGESET_JOB,
        |command, deps| async move { run_execute_job(command, &deps).await },
    );
}

/// Job handler: load the changeset and run the execution engine.
///
/// A missing changeset is logged and otherwise ignored. Engine errors are
/// logged and swallowed - execution failures end up as a FAILED status on
/// the changeset, and there is no automatic retry either way.
pub async fn run_execute_job(
    command: ExecuteChangesetCommand,
    deps: &Arc<ServerDeps>,
) -> anyhow::Result<()> {
    match Changeset::find_by_id(command.changeset_id, &deps.db_pool).await? {
        None => {
            error!(changeset_id = %command.changeset_id, "no changeset to execute");
        }
        Some(changeset) => {
            if let Err(e) = execute_changeset(changeset.id, deps).await {
                error!(changeset = %changeset.name, error = %e, "error executing changeset");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_metadata() {
        let command = ExecuteChangesetCommand {
            changeset_id: ChangesetId::new(),
        };

        assert_eq!(command.command_type(), EXECUTE_CHANGESET_JOB);
        assert_eq!(command.reference_id(), command.changeset_id.into_uuid());
        assert_eq!(
            command.idempotency_key().unwrap(),
            format!("execute_changeset:{}", command.changeset_id)
        );
    }

    #[test]
    fn command_serde_roundtrip() {
        let command = ExecuteChangesetCommand {
            changeset_id: ChangesetId::new(),
        };
        let json = serde_json::to_value(&command).unwrap();
        let parsed: ExecuteChangesetCommand = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.changeset_id, command.changeset_id);
    }
}
