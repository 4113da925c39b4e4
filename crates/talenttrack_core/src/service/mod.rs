//! Use-case services.
//!
//! # Responsibility
//! - Wire the mutation pipeline to repository-backed action bodies.
//! - Keep calling layers decoupled from SQL and stage-chain details.

pub mod candidate_service;
pub mod topic_service;
