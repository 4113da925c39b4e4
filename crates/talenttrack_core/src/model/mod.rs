//! Domain models.
//!
//! # Responsibility
//! - Define the canonical records shared by repositories and services.
//! - Keep serialization names aligned with the external schema.

pub mod candidate;
pub mod identity;
pub mod team;
pub mod topic;
