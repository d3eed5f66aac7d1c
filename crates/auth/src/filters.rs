//! Scope predicate builder.
//!
//! Every entity type follows the same shape: ADMIN matches everything, any
//! other role gets the OR of its anchor clauses for that entity. The anchors
//! are declared once per entity in [`scope_spec`]; the builder is shared.
//!
//! A branch or account clause whose membership set is empty is dropped, and
//! a role left with no clauses gets [`Predicate::nothing`]. A non-ADMIN never
//! falls back to the universal predicate.

use tracing::debug;

use chatdesk_core::EntityType;

use crate::{Field, Predicate, Role, Scope};

/// A field used to test scope membership of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Field holds a branch id; matches when it is in the actor's branches.
    Branch(Field),
    /// Field holds a WhatsApp account id; matches when it is in the actor's accounts.
    Account(Field),
    /// Field holds a user id; matches when it is the actor.
    Owner(Field),
}

/// Declarative scope anchors of one entity type, per non-ADMIN role.
#[derive(Debug)]
pub struct EntityScopeSpec {
    pub entity: EntityType,
    pub supervisor: &'static [Anchor],
    pub agent: &'static [Anchor],
}

impl EntityScopeSpec {
    pub fn anchors_for(&self, role: Role) -> &'static [Anchor] {
        match role {
            Role::Admin => &[],
            Role::Supervisor => self.supervisor,
            Role::Agent => self.agent,
        }
    }
}

const fn branch(path: &'static str) -> Anchor {
    Anchor::Branch(Field::from_static(path))
}

const fn account(path: &'static str) -> Anchor {
    Anchor::Account(Field::from_static(path))
}

const fn owner(path: &'static str) -> Anchor {
    Anchor::Owner(Field::from_static(path))
}

static CONVERSATION: EntityScopeSpec = EntityScopeSpec {
    entity: EntityType::Conversation,
    supervisor: &[branch("contact.branchId"), account("messages.whatsappAccountId")],
    agent: &[owner("assignedToId")],
};

static CONTACT: EntityScopeSpec = EntityScopeSpec {
    entity: EntityType::Contact,
    supervisor: &[
        branch("branchId"),
        account("conversations.messages.whatsappAccountId"),
    ],
    agent: &[owner("conversations.assignedToId")],
};

static BOOKING: EntityScopeSpec = EntityScopeSpec {
    entity: EntityType::Booking,
    supervisor: &[branch("contact.branchId")],
    agent: &[owner("agentId")],
};

static TEMPLATE: EntityScopeSpec = EntityScopeSpec {
    entity: EntityType::Template,
    supervisor: &[account("whatsappAccountId")],
    agent: &[account("whatsappAccountId")],
};

static BOT_FLOW: EntityScopeSpec = EntityScopeSpec {
    entity: EntityType::BotFlow,
    supervisor: &[branch("branchId"), account("whatsappAccountId")],
    agent: &[branch("branchId"), account("whatsappAccountId")],
};

static WHATSAPP_ACCOUNT: EntityScopeSpec = EntityScopeSpec {
    entity: EntityType::WhatsAppAccount,
    supervisor: &[account("id"), branch("branchId")],
    agent: &[account("id")],
};

/// Anchor declaration for `entity`.
pub fn scope_spec(entity: EntityType) -> &'static EntityScopeSpec {
    match entity {
        EntityType::Contact => &CONTACT,
        EntityType::Conversation => &CONVERSATION,
        EntityType::Booking => &BOOKING,
        EntityType::Template => &TEMPLATE,
        EntityType::BotFlow => &BOT_FLOW,
        EntityType::WhatsAppAccount => &WHATSAPP_ACCOUNT,
    }
}

/// Build the row filter for `entity` under `scope`.
pub fn build_scope_filter(scope: &Scope, entity: EntityType) -> Predicate {
    if scope.is_admin() {
        return Predicate::All;
    }

    let clauses = scope_spec(entity)
        .anchors_for(scope.role)
        .iter()
        .map(|anchor| anchor_clause(scope, anchor))
        .filter(|clause| !clause.is_nothing());

    let filter = Predicate::any_of(clauses);
    if filter.is_nothing() {
        debug!(user_id = %scope.user_id, role = %scope.role, entity = %entity, "empty scope; filter matches nothing");
    }
    filter
}

fn anchor_clause(scope: &Scope, anchor: &Anchor) -> Predicate {
    match anchor {
        Anchor::Branch(field) => Predicate::is_in(
            field.clone(),
            scope.branch_ids.iter().map(|b| b.as_str().to_string()),
        ),
        Anchor::Account(field) => Predicate::is_in(
            field.clone(),
            scope.whatsapp_account_ids.iter().map(|a| a.as_str().to_string()),
        ),
        Anchor::Owner(field) => Predicate::equals(field.clone(), scope.user_id.as_str()),
    }
}

pub fn build_contact_scope_filter(scope: &Scope) -> Predicate {
    build_scope_filter(scope, EntityType::Contact)
}

pub fn build_conversation_scope_filter(scope: &Scope) -> Predicate {
    build_scope_filter(scope, EntityType::Conversation)
}

pub fn build_booking_scope_filter(scope: &Scope) -> Predicate {
    build_scope_filter(scope, EntityType::Booking)
}

pub fn build_template_scope_filter(scope: &Scope) -> Predicate {
    build_scope_filter(scope, EntityType::Template)
}

pub fn build_bot_flow_scope_filter(scope: &Scope) -> Predicate {
    build_scope_filter(scope, EntityType::BotFlow)
}

pub fn build_whatsapp_account_scope_filter(scope: &Scope) -> Predicate {
    build_scope_filter(scope, EntityType::WhatsAppAccount)
}
