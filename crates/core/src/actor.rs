use serde::{Deserialize, Serialize};

use crate::domain::user::{Role, UserId};

/// The authenticated caller, as asserted by the fronting identity provider.
/// Passed explicitly into every lifecycle operation; the core never reads
/// ambient session state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    pub user_id: UserId,
    pub role: Role,
}

impl ActorContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    pub fn can_triage(&self) -> bool {
        self.role.can_triage()
    }
}
