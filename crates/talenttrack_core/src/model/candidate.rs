//! Candidate aggregate model.
//!
//! # Responsibility
//! - Define the candidate record and its owned skill collection.
//! - Provide status string codecs matching the `candidates.status` column.
//!
//! # Invariants
//! - Candidates are team-scoped: `team_uuid` is stored, not just authorized.
//! - Deleting a candidate cascades deletion of its skills.

use crate::model::team::TeamId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable candidate identifier.
pub type CandidateId = Uuid;

/// Stable candidate skill identifier.
pub type SkillId = Uuid;

/// Hiring funnel stage for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Applied,
    Screening,
    Interview,
    Offer,
    Hired,
    Rejected,
}

/// Candidate record tracked by one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Stable candidate id.
    pub uuid: CandidateId,
    /// Owning team id.
    pub team_uuid: TeamId,
    /// Candidate display name.
    pub full_name: String,
    /// Optional contact email.
    pub email: Option<String>,
    /// Optional contact phone.
    pub phone: Option<String>,
    /// Current funnel stage.
    pub status: CandidateStatus,
    /// Optional recruiter notes.
    pub notes: Option<String>,
}

/// Persisted skill entry owned by one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSkill {
    /// Stable skill id.
    pub uuid: SkillId,
    /// Owning candidate id.
    pub candidate_uuid: CandidateId,
    /// Skill name, unique within its candidate.
    pub name: String,
    /// Optional proficiency label.
    pub level: Option<String>,
}

/// Maps one status to its stable `candidates.status` column value.
pub fn status_to_db(status: CandidateStatus) -> &'static str {
    match status {
        CandidateStatus::Applied => "applied",
        CandidateStatus::Screening => "screening",
        CandidateStatus::Interview => "interview",
        CandidateStatus::Offer => "offer",
        CandidateStatus::Hired => "hired",
        CandidateStatus::Rejected => "rejected",
    }
}

/// Parses one status from its `candidates.status` column value.
pub fn parse_status(value: &str) -> Option<CandidateStatus> {
    match value {
        "applied" => Some(CandidateStatus::Applied),
        "screening" => Some(CandidateStatus::Screening),
        "interview" => Some(CandidateStatus::Interview),
        "offer" => Some(CandidateStatus::Offer),
        "hired" => Some(CandidateStatus::Hired),
        "rejected" => Some(CandidateStatus::Rejected),
        _ => None,
    }
}
