//! Core domain logic for TalentTrack.
//! This crate is the single source of truth for business invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::candidate::{Candidate, CandidateId, CandidateSkill, CandidateStatus};
pub use model::identity::{Identity, Role, UserId};
pub use model::team::{Team, TeamId};
pub use model::topic::{Subtopic, SubtopicId, Topic, TopicId};
pub use pipeline::payload::{FieldError, MutationPayload};
pub use pipeline::{ExecutionMode, MutationContext, MutationPipeline, PipelineFailure};
pub use reconcile::{
    diff_children, ChildDiff, ChildPatch, ReconcileError, ReconcileResult, ReconciliationSummary,
    TargetChild,
};
pub use service::candidate_service::{CandidateAdminService, CandidateMutationOutput};
pub use service::topic_service::{TopicAdminService, TopicMutationOutput};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
