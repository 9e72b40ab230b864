use std::collections::HashSet;

use super::{AuthError, StaffCapability};
use crate::common::entity_ids::UserId;

/// A staff user performing an operation, with their resolved capability set.
///
/// Usage:
/// ```ignore
/// actor.require(StaffCapability::ApproveChangesets)?;
/// ```
#[derive(Debug, Clone)]
pub struct Actor {
    user_id: UserId,
    capabilities: HashSet<StaffCapability>,
}

impl Actor {
    /// Create an actor with no capabilities.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            capabilities: HashSet::new(),
        }
    }

    /// Create an actor holding the given capabilities.
    pub fn with_capabilities(
        user_id: UserId,
        capabilities: impl IntoIterator<Item = StaffCapability>,
    ) -> Self {
        Self {
            user_id,
            capabilities: capabilities.into_iter().collect(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Whether the actor holds the capability.
    pub fn can(&self, capability: StaffCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Fail with `PermissionDenied` unless the actor holds the capability.
    pub fn require(&self, capability: StaffCapability) -> Result<(), AuthError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(AuthError::PermissionDenied(format!("{capability:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_with_capability_passes_check() {
        let actor =
            Actor::with_capabilities(UserId::new(), [StaffCapability::ApproveChangesets]);
        assert!(actor.require(StaffCapability::ApproveChangesets).is_ok());
    }

    #[test]
    fn actor_without_capability_is_denied() {
        let actor = Actor::new(UserId::new());
        let result = actor.require(StaffCapability::QueueChangesets);
        assert!(matches!(result, Err(AuthError::PermissionDenied(_))));
    }
}
