//! Scoped business entity kinds.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Business entities whose rows are subject to scope filtering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Contact,
    Conversation,
    Booking,
    Template,
    BotFlow,
    #[serde(rename = "whatsapp_account")]
    WhatsAppAccount,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Contact,
        EntityType::Conversation,
        EntityType::Booking,
        EntityType::Template,
        EntityType::BotFlow,
        EntityType::WhatsAppAccount,
    ];

    /// Stable snake_case name (used in capability names, audit records and storage).
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Contact => "contact",
            EntityType::Conversation => "conversation",
            EntityType::Booking => "booking",
            EntityType::Template => "template",
            EntityType::BotFlow => "bot_flow",
            EntityType::WhatsAppAccount => "whatsapp_account",
        }
    }

    /// Collection path segment used by the HTTP surface.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityType::Contact => "contacts",
            EntityType::Conversation => "conversations",
            EntityType::Booking => "bookings",
            EntityType::Template => "templates",
            EntityType::BotFlow => "bot-flows",
            EntityType::WhatsAppAccount => "whatsapp-accounts",
        }
    }

    /// Fields captured as the prior-state snapshot before a destructive operation.
    pub fn snapshot_fields(&self) -> &'static [&'static str] {
        match self {
            EntityType::Contact => &["name", "phone", "branchId"],
            EntityType::Conversation => &["contactId", "assignedToId", "status"],
            EntityType::Booking => &["contactId", "agentId", "scheduledAt", "status"],
            EntityType::Template => &["name", "category"],
            EntityType::BotFlow => &["name", "branchId", "whatsappAccountId", "isActive"],
            EntityType::WhatsAppAccount => &["phoneNumber", "displayName", "branchId"],
        }
    }
}

impl core::fmt::Display for EntityType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|e| e.as_str() == s || e.collection() == s)
            .ok_or_else(|| DomainError::unknown("entity type", s))
    }
}
