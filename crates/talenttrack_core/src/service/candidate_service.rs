//! Candidate use-case service.
//!
//! # Responsibility
//! - Expose create/update entry points for team-scoped candidates.
//! - Reconcile the skill collection after the primary candidate write.
//!
//! # Invariants
//! - The candidate row write is the primary mutation and commits on its own.
//! - Skill reconciliation is best-effort by design: a failure is logged and
//!   reported via `skills_synced`, never rolled back with the primary write.

use crate::model::candidate::{parse_status, CandidateId, CandidateStatus};
use crate::pipeline::payload::{
    as_object, optional_array, optional_string, require_string, require_uuid, FieldError,
    MutationPayload,
};
use crate::pipeline::{ActionError, MutationPipeline, PipelineFailure};
use crate::reconcile::{ReconciliationSummary, TargetChild};
use crate::repo::candidate_repo::{
    CandidateDraft, CandidatePatch, CandidateRepository, SkillPatch, SqliteCandidateRepository,
};
use crate::repo::SqliteMutationStore;
use log::warn;
use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

const FULL_NAME_MAX_CHARS: usize = 160;
const CONTACT_MAX_CHARS: usize = 120;
const NOTES_MAX_CHARS: usize = 4000;
const SKILL_NAME_MAX_CHARS: usize = 80;
const SKILL_LEVEL_MAX_CHARS: usize = 40;

/// Result of one candidate mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateMutationOutput {
    /// The affected candidate.
    pub candidate_id: CandidateId,
    /// Whether the skill collection was brought in sync with the payload.
    pub skills_synced: bool,
    /// Skill operation counts applied by this mutation.
    pub skills: ReconciliationSummary,
}

/// Request model for creating a candidate with initial skills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCandidatePayload {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: CandidateStatus,
    pub notes: Option<String>,
    pub skills: Vec<SkillPatch>,
}

impl MutationPayload for CreateCandidatePayload {
    fn parse(raw: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let Some(obj) = as_object(raw, &mut errors) else {
            return Err(errors);
        };

        let full_name = require_string(obj, "full_name", FULL_NAME_MAX_CHARS, &mut errors);
        let email = optional_string(obj, "email", CONTACT_MAX_CHARS, &mut errors);
        let phone = optional_string(obj, "phone", CONTACT_MAX_CHARS, &mut errors);
        let notes = optional_string(obj, "notes", NOTES_MAX_CHARS, &mut errors);
        let status = parse_status_field(obj, &mut errors).unwrap_or(CandidateStatus::Applied);

        let mut skills = Vec::new();
        if let Some(items) = optional_array(obj, "skills", &mut errors) {
            for (index, item) in items.iter().enumerate() {
                if let Some(entry) = parse_skill_entry(item, index, false, &mut errors) {
                    skills.push(entry.patch);
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            full_name: full_name.unwrap_or_default(),
            email,
            phone,
            status,
            notes,
            skills,
        })
    }
}

/// Request model for updating a candidate and reconciling its skills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCandidatePayload {
    pub candidate_id: CandidateId,
    pub patch: CandidatePatch,
    /// Full desired skill state; an absent payload key leaves the collection
    /// untouched.
    pub skills: Option<Vec<TargetChild<SkillPatch>>>,
}

impl MutationPayload for UpdateCandidatePayload {
    fn parse(raw: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let Some(obj) = as_object(raw, &mut errors) else {
            return Err(errors);
        };

        let candidate_id = require_uuid(obj, "candidate_id", &mut errors);
        let patch = CandidatePatch {
            full_name: optional_string(obj, "full_name", FULL_NAME_MAX_CHARS, &mut errors),
            email: optional_string(obj, "email", CONTACT_MAX_CHARS, &mut errors),
            phone: optional_string(obj, "phone", CONTACT_MAX_CHARS, &mut errors),
            status: parse_status_field(obj, &mut errors),
            notes: optional_string(obj, "notes", NOTES_MAX_CHARS, &mut errors),
        };

        // Only a truly absent key leaves the collection untouched; `null` is
        // rejected the same way a non-list value is.
        let skills = match obj.get("skills") {
            None => None,
            Some(Value::Array(items)) => {
                let mut parsed = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    if let Some(entry) = parse_skill_entry(item, index, true, &mut errors) {
                        parsed.push(entry);
                    }
                }
                Some(parsed)
            }
            Some(_) => {
                errors.push(FieldError::new("skills", "must be a list"));
                None
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            candidate_id: candidate_id.unwrap_or_default(),
            patch,
            skills,
        })
    }
}

fn parse_status_field(
    obj: &serde_json::Map<String, Value>,
    errors: &mut Vec<FieldError>,
) -> Option<CandidateStatus> {
    match obj.get("status") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => match parse_status(text.trim()) {
            Some(status) => Some(status),
            None => {
                errors.push(FieldError::new(
                    "status",
                    "must be one of applied|screening|interview|offer|hired|rejected",
                ));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new("status", "must be a string"));
            None
        }
    }
}

fn parse_skill_entry(
    value: &Value,
    index: usize,
    allow_ids: bool,
    errors: &mut Vec<FieldError>,
) -> Option<TargetChild<SkillPatch>> {
    let field = |name: &str| format!("skills[{index}].{name}");

    let Some(obj) = value.as_object() else {
        errors.push(FieldError::new(
            format!("skills[{index}]"),
            "must be an object",
        ));
        return None;
    };

    let before = errors.len();
    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => match Uuid::parse_str(text.trim()) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                errors.push(FieldError::new(field("id"), "must be a valid id"));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(field("id"), "must be a valid id"));
            None
        }
    };

    if id.is_some() && !allow_ids {
        errors.push(FieldError::new(
            field("id"),
            "must not be set when creating a candidate",
        ));
    }

    let name = match obj.get("name") {
        None | Some(Value::Null) if id.is_none() => {
            errors.push(FieldError::new(field("name"), "is required"));
            None
        }
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                errors.push(FieldError::new(field("name"), "must not be empty"));
                None
            } else if trimmed.chars().count() > SKILL_NAME_MAX_CHARS {
                errors.push(FieldError::new(
                    field("name"),
                    format!("must be at most {SKILL_NAME_MAX_CHARS} characters"),
                ));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(_) => {
            errors.push(FieldError::new(field("name"), "must be a string"));
            None
        }
    };

    let level = match obj.get("level") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.chars().count() > SKILL_LEVEL_MAX_CHARS {
                errors.push(FieldError::new(
                    field("level"),
                    format!("must be at most {SKILL_LEVEL_MAX_CHARS} characters"),
                ));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(_) => {
            errors.push(FieldError::new(field("level"), "must be a string"));
            None
        }
    };

    if errors.len() > before {
        return None;
    }

    Some(TargetChild {
        id,
        patch: SkillPatch { name, level },
    })
}

/// Use-case service for candidate mutations.
pub struct CandidateAdminService {
    pipeline: MutationPipeline,
}

impl CandidateAdminService {
    /// Creates a service running mutations through the given pipeline.
    pub fn new(pipeline: MutationPipeline) -> Self {
        Self { pipeline }
    }

    /// Creates one candidate for the authorized team, then syncs skills.
    pub fn create_candidate(
        &self,
        conn: &mut Connection,
        session_token: Option<&str>,
        raw: &Value,
    ) -> Result<CandidateMutationOutput, PipelineFailure> {
        let mut store = SqliteMutationStore::new(conn);
        self.pipeline.mutate(
            &mut store,
            "candidate_create",
            session_token,
            raw,
            |store, context, payload: CreateCandidatePayload| {
                let mut repo = SqliteCandidateRepository::new(store.connection());
                let candidate_id = repo
                    .create_candidate(&CandidateDraft {
                        team_uuid: context.team.uuid,
                        full_name: payload.full_name,
                        email: payload.email,
                        phone: payload.phone,
                        status: payload.status,
                        notes: payload.notes,
                    })
                    .map_err(ActionError::from)?;

                let target = payload
                    .skills
                    .into_iter()
                    .map(|patch| TargetChild { id: None, patch })
                    .collect();
                let (skills_synced, skills) = sync_skills(&mut repo, candidate_id, target);

                Ok(CandidateMutationOutput {
                    candidate_id,
                    skills_synced,
                    skills,
                })
            },
        )
    }

    /// Patches one candidate of the authorized team, then syncs skills when
    /// the payload carries a skill list.
    pub fn update_candidate(
        &self,
        conn: &mut Connection,
        session_token: Option<&str>,
        raw: &Value,
    ) -> Result<CandidateMutationOutput, PipelineFailure> {
        let mut store = SqliteMutationStore::new(conn);
        self.pipeline.mutate(
            &mut store,
            "candidate_update",
            session_token,
            raw,
            |store, context, payload: UpdateCandidatePayload| {
                let mut repo = SqliteCandidateRepository::new(store.connection());
                repo.update_candidate(context.team.uuid, payload.candidate_id, &payload.patch)
                    .map_err(ActionError::from)?;

                let (skills_synced, skills) = match payload.skills {
                    Some(target) => sync_skills(&mut repo, payload.candidate_id, target),
                    None => (true, ReconciliationSummary::default()),
                };

                Ok(CandidateMutationOutput {
                    candidate_id: payload.candidate_id,
                    skills_synced,
                    skills,
                })
            },
        )
    }
}

fn sync_skills(
    repo: &mut SqliteCandidateRepository<'_>,
    candidate_id: CandidateId,
    target: Vec<TargetChild<SkillPatch>>,
) -> (bool, ReconciliationSummary) {
    match repo.replace_skills(candidate_id, target) {
        Ok(summary) => (true, summary),
        Err(err) => {
            warn!(
                "event=skill_sync module=service status=error candidate={candidate_id} error={err}"
            );
            (false, ReconciliationSummary::default())
        }
    }
}
