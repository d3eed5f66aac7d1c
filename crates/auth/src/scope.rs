use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use chatdesk_core::{BranchId, UserId, WhatsAppAccountId};

use crate::Role;

/// The resolved branch/account/ownership constraints for one actor.
///
/// Rebuilt on every request from the credential store; never cached and
/// never persisted as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub user_id: UserId,
    pub role: Role,
    pub branch_ids: BTreeSet<BranchId>,
    pub whatsapp_account_ids: BTreeSet<WhatsAppAccountId>,
}

impl Scope {
    pub fn new<B, A>(user_id: UserId, role: Role, branch_ids: B, whatsapp_account_ids: A) -> Self
    where
        B: IntoIterator<Item = BranchId>,
        A: IntoIterator<Item = WhatsAppAccountId>,
    {
        Self {
            user_id,
            role,
            branch_ids: branch_ids.into_iter().collect(),
            whatsapp_account_ids: whatsapp_account_ids.into_iter().collect(),
        }
    }

    /// A scope with no branch or account memberships.
    pub fn bare(user_id: UserId, role: Role) -> Self {
        Self::new(user_id, role, [], [])
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn covers_branch(&self, branch_id: &BranchId) -> bool {
        self.is_admin() || self.branch_ids.contains(branch_id)
    }

    pub fn covers_account(&self, account_id: &WhatsAppAccountId) -> bool {
        self.is_admin() || self.whatsapp_account_ids.contains(account_id)
    }
}
