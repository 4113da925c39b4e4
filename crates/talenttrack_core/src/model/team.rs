//! Team scoping model.
//!
//! # Responsibility
//! - Define the team record every mutation is authorized against.
//! - Provide lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `deleted_at` is the source of truth for tombstone state.
//! - A mutation is only valid against a team whose `deleted_at` is unset.

use crate::model::identity::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable team identifier.
pub type TeamId = Uuid;

/// Team record used for mutation authorization.
///
/// The core only reads teams; creation and administration happen outside the
/// mutation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Stable team id.
    pub uuid: TeamId,
    /// User-facing team name.
    pub name: String,
    /// Owning user id.
    pub owner_user_uuid: UserId,
    /// Soft delete tombstone in epoch milliseconds.
    pub deleted_at: Option<i64>,
}

impl Team {
    /// Returns whether this team can still authorize mutations.
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}
