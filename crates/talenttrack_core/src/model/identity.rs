//! Caller identity resolved from an opaque session handle.
//!
//! # Responsibility
//! - Define the identity record the mutation pipeline consumes.
//! - Provide role string codecs matching the `users.role` column.
//!
//! # Invariants
//! - An identity exists only for the duration of one session; the pipeline
//!   never creates or persists one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a user account.
pub type UserId = Uuid;

/// Authorization role carried by an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access to every team.
    Admin,
    /// Access limited to owned teams and explicit memberships.
    Member,
}

/// Resolved caller identity, consumed by the mutation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id.
    pub user_id: UserId,
    /// Authorization role.
    pub role: Role,
}

/// Maps one role to its stable `users.role` column value.
pub fn role_to_db(role: Role) -> &'static str {
    match role {
        Role::Admin => "admin",
        Role::Member => "member",
    }
}

/// Parses one role from its `users.role` column value.
pub fn parse_role(value: &str) -> Option<Role> {
    match value {
        "admin" => Some(Role::Admin),
        "member" => Some(Role::Member),
        _ => None,
    }
}
