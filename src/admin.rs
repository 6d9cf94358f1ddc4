//! `AdminAuthority`: gates the privileged operations (`create_market`,
//! `resolve_market`, `sweep_unmatched_bids`) to a configured set of callers.
//!
//! The engine has no notion of roles beyond "admin or not" -- this trait
//! exists so a host can swap in something richer (a multisig check, a JWT
//! claim lookup) without the engine depending on it directly.

use std::collections::HashSet;

use crate::errors::EngineError;
use crate::types::ParticipantId;

pub trait AdminAuthority {
    /// Returns `Ok(())` if `caller` may perform admin-only operations,
    /// `Err(EngineError::Unauthorized)` otherwise.
    fn require_admin(&self, caller: &ParticipantId) -> Result<(), EngineError>;
}

/// Fixed set of admin participant ids, configured at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticAdminSet {
    admins: HashSet<ParticipantId>,
}

impl StaticAdminSet {
    pub fn new(admins: impl IntoIterator<Item = ParticipantId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, who: &ParticipantId) -> bool {
        self.admins.contains(who)
    }
}

impl AdminAuthority for StaticAdminSet {
    fn require_admin(&self, caller: &ParticipantId) -> Result<(), EngineError> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized {
                caller: caller.clone(),
            })
        }
    }
}
