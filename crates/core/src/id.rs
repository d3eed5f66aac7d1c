//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are opaque strings: the credential and entity stores own their
//! format (cuid, uuid, ...). The only invariant enforced here is non-emptiness.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a user (actor identity).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// Identifier of a branch (office/location a user or account belongs to).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(String);

/// Identifier of a connected WhatsApp business account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WhatsAppAccountId(String);

/// Identifier of a scoped business record (contact, booking, template, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

macro_rules! impl_string_id {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap an identifier issued by a store.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate a fresh identifier (UUIDv7, time-ordered).
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $t {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: empty", $name)));
                }
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

impl_string_id!(UserId, "UserId");
impl_string_id!(BranchId, "BranchId");
impl_string_id!(WhatsAppAccountId, "WhatsAppAccountId");
impl_string_id!(RecordId, "RecordId");
