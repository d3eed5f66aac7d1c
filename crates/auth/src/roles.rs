use core::str::FromStr;

use serde::{Deserialize, Serialize};

use chatdesk_core::DomainError;

/// Role identifier used for RBAC.
///
/// Roles are not a strict hierarchy: SUPERVISOR reads more rows than AGENT,
/// but individual capabilities are granted per role by the permission table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Supervisor,
    Agent,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Admin, Role::Supervisor, Role::Agent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Supervisor => "SUPERVISOR",
            Role::Agent => "AGENT",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(Role::Admin),
            "SUPERVISOR" => Ok(Role::Supervisor),
            "AGENT" => Ok(Role::Agent),
            _ => Err(DomainError::unknown("role", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("supervisor".parse::<Role>().unwrap(), Role::Supervisor);
        assert_eq!(" AGENT ".parse::<Role>().unwrap(), Role::Agent);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_upper_case_names() {
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), serde_json::json!("ADMIN"));
        let r: Role = serde_json::from_value(serde_json::json!("AGENT")).unwrap();
        assert_eq!(r, Role::Agent);
    }
}
