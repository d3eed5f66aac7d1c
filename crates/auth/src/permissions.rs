use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use chatdesk_core::EntityType;

use crate::Role;

/// Capability identifier.
///
/// Capabilities are opaque snake_case strings (e.g. "delete_template") checked
/// independently of role rank through the [`PermissionTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Capability that marks `entity` as deletable for a role.
    pub fn delete(entity: EntityType) -> Self {
        Self::new(format!("delete_{}", entity.as_str()))
    }

    /// Capability required to edit `entity`, when edits are capability-gated at all.
    pub fn edit(entity: EntityType) -> Option<Self> {
        match entity {
            EntityType::Template => Some(capabilities::EDIT_TEMPLATE),
            EntityType::BotFlow => Some(capabilities::EDIT_BOT_FLOW),
            EntityType::WhatsAppAccount => Some(capabilities::MANAGE_WHATSAPP_ACCOUNTS),
            EntityType::Contact | EntityType::Conversation | EntityType::Booking => None,
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known capability names.
pub mod capabilities {
    use super::Capability;

    pub const VIEW_REPORTS: Capability = Capability::from_static("view_reports");
    pub const MANAGE_USERS: Capability = Capability::from_static("manage_users");
    pub const MANAGE_BRANCHES: Capability = Capability::from_static("manage_branches");
    pub const MANAGE_WHATSAPP_ACCOUNTS: Capability = Capability::from_static("manage_whatsapp_accounts");
    pub const ASSIGN_CONVERSATION: Capability = Capability::from_static("assign_conversation");
    pub const SEND_MESSAGE: Capability = Capability::from_static("send_message");
    pub const CREATE_CONTACT: Capability = Capability::from_static("create_contact");
    pub const CREATE_BOOKING: Capability = Capability::from_static("create_booking");
    pub const CREATE_TEMPLATE: Capability = Capability::from_static("create_template");
    pub const EDIT_TEMPLATE: Capability = Capability::from_static("edit_template");
    pub const CREATE_BOT_FLOW: Capability = Capability::from_static("create_bot_flow");
    pub const EDIT_BOT_FLOW: Capability = Capability::from_static("edit_bot_flow");
    pub const VIEW_AUDIT_LOG: Capability = Capability::from_static("view_audit_log");
    pub const DELETE_BOOKING: Capability = Capability::from_static("delete_booking");
    pub const DELETE_CONTACT: Capability = Capability::from_static("delete_contact");
    pub const DELETE_CONVERSATION: Capability = Capability::from_static("delete_conversation");
    pub const DELETE_TEMPLATE: Capability = Capability::from_static("delete_template");
    pub const DELETE_BOT_FLOW: Capability = Capability::from_static("delete_bot_flow");
    pub const DELETE_WHATSAPP_ACCOUNT: Capability = Capability::from_static("delete_whatsapp_account");
}

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const ADMIN_SUPERVISOR: &[Role] = &[Role::Admin, Role::Supervisor];
const EVERYONE: &[Role] = &[Role::Admin, Role::Supervisor, Role::Agent];

/// Built-in capability grants.
pub const DEFAULT_GRANTS: &[(Capability, &[Role])] = &[
    (capabilities::VIEW_REPORTS, ADMIN_SUPERVISOR),
    (capabilities::MANAGE_USERS, ADMIN_ONLY),
    (capabilities::MANAGE_BRANCHES, ADMIN_ONLY),
    (capabilities::MANAGE_WHATSAPP_ACCOUNTS, ADMIN_ONLY),
    (capabilities::ASSIGN_CONVERSATION, ADMIN_SUPERVISOR),
    (capabilities::SEND_MESSAGE, EVERYONE),
    (capabilities::CREATE_CONTACT, EVERYONE),
    (capabilities::CREATE_BOOKING, EVERYONE),
    (capabilities::CREATE_TEMPLATE, ADMIN_SUPERVISOR),
    (capabilities::EDIT_TEMPLATE, ADMIN_SUPERVISOR),
    (capabilities::CREATE_BOT_FLOW, ADMIN_SUPERVISOR),
    (capabilities::EDIT_BOT_FLOW, ADMIN_SUPERVISOR),
    (capabilities::VIEW_AUDIT_LOG, ADMIN_ONLY),
    (capabilities::DELETE_BOOKING, ADMIN_SUPERVISOR),
    (capabilities::DELETE_CONTACT, ADMIN_ONLY),
    (capabilities::DELETE_CONVERSATION, ADMIN_ONLY),
    (capabilities::DELETE_TEMPLATE, ADMIN_ONLY),
    (capabilities::DELETE_BOT_FLOW, ADMIN_ONLY),
    (capabilities::DELETE_WHATSAPP_ACCOUNT, ADMIN_ONLY),
];

/// Immutable capability → allowed-roles mapping.
///
/// Built once at startup and shared by reference; there is no mutation API.
/// Capabilities missing from the table are denied for every role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionTable {
    grants: BTreeMap<Capability, BTreeSet<Role>>,
}

impl PermissionTable {
    pub fn from_grants<'a, I>(grants: I) -> Self
    where
        I: IntoIterator<Item = (Capability, &'a [Role])>,
    {
        let mut map: BTreeMap<Capability, BTreeSet<Role>> = BTreeMap::new();
        for (capability, roles) in grants {
            map.entry(capability).or_default().extend(roles.iter().copied());
        }
        Self { grants: map }
    }

    /// The built-in table ([`DEFAULT_GRANTS`]).
    pub fn standard() -> Self {
        Self::from_grants(DEFAULT_GRANTS.iter().map(|(capability, roles)| (capability.clone(), *roles)))
    }

    pub fn has_permission(&self, role: Role, capability: &str) -> bool {
        self.grants
            .get(capability)
            .is_some_and(|roles| roles.contains(&role))
    }

    /// Roles allowed to exercise `capability` (empty when unknown).
    pub fn roles_for(&self, capability: &str) -> Vec<Role> {
        self.grants
            .get(capability)
            .map(|roles| roles.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Capabilities granted to `role`, sorted by name.
    pub fn capabilities_of(&self, role: Role) -> Vec<&Capability> {
        self.grants
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(cap, _)| cap)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Capability, &BTreeSet<Role>)> {
        self.grants.iter()
    }

    /// Whether `entity` is explicitly marked deletable for `role`.
    pub fn is_deletable_by(&self, role: Role, entity: EntityType) -> bool {
        self.has_permission(role, Capability::delete(entity).as_str())
    }
}

impl Default for PermissionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl core::borrow::Borrow<str> for Capability {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

/// Convenience wrapper mirroring the handler-facing `has_permission(role, name)` check.
pub fn has_permission(table: &PermissionTable, role: Role, capability: &str) -> bool {
    table.has_permission(role, capability)
}
