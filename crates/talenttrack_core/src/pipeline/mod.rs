//! Mutation pipeline: the guard chain every write operation passes through.
//!
//! # Responsibility
//! - Run identity resolution, team-ownership confirmation, schema validation
//!   and the business action in that fixed order.
//! - Convert every failure into a typed `PipelineFailure` at the point of
//!   detection; collaborator error types never cross this boundary.
//!
//! # Invariants
//! - A failed stage short-circuits: later stages (including the action body)
//!   never run, so a denied request has no side effects.
//! - Authentication precedes authorization precedes validation: validation
//!   errors are never computed for a caller not authorized against the
//!   claimed team.
//! - The pipeline is stateless per invocation; callers own retry semantics.

use crate::model::identity::{Identity, Role};
use crate::model::team::{Team, TeamId};
use crate::reconcile::ReconcileError;
use crate::repo::candidate_repo::CandidateRepoError;
use crate::repo::{IdentityStore, StoreError, TeamStore};
use log::{info, warn};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub mod payload;

pub use payload::{FieldError, MutationPayload};

/// Failure detail policy for messages that may carry internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Generic messages for catch-all failures.
    Production,
    /// Original messages pass through for debuggability.
    Development,
}

/// Context accumulated by the guard stages and handed to the action body.
#[derive(Debug, Clone)]
pub struct MutationContext {
    /// Resolved caller identity.
    pub identity: Identity,
    /// Resolved, non-deleted team the mutation is authorized against.
    pub team: Team,
}

/// Typed failure surfaced to the caller for any denied or failed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineFailure {
    /// No resolvable identity for the session handle.
    Unauthenticated,
    /// The payload carries no team id at all.
    MissingTeamId,
    /// The claimed team does not exist or is soft-deleted.
    TeamNotFound,
    /// The identity is not authorized against the claimed team.
    Forbidden,
    /// One entry per invalid payload field; the action body never ran.
    ValidationFailed(Vec<FieldError>),
    /// The action body failed; `field` names the offending form field when
    /// the underlying constraint is recognizable.
    ActionFailed {
        message: String,
        field: Option<String>,
    },
    /// Infrastructure failure in a read-only stage.
    Internal(String),
}

impl Display for PipelineFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "authentication required"),
            Self::MissingTeamId => write!(f, "team id is required"),
            Self::TeamNotFound => write!(f, "team not found"),
            Self::Forbidden => write!(f, "not allowed for this team"),
            Self::ValidationFailed(errors) => {
                write!(f, "validation failed for {} field(s)", errors.len())
            }
            Self::ActionFailed { message, .. } => write!(f, "{message}"),
            Self::Internal(message) => write!(f, "{message}"),
        }
    }
}

impl Error for PipelineFailure {}

/// Action-body error funneled into `PipelineFailure::ActionFailed`.
#[derive(Debug)]
pub enum ActionError {
    /// Reconciliation failure with its own user-facing taxonomy.
    Reconcile(ReconcileError),
    /// Candidate persistence failure.
    Candidate(CandidateRepoError),
    /// Identity/team store failure inside the action body.
    Store(StoreError),
    /// Free-form business failure.
    Failed(String),
}

impl Display for ActionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reconcile(err) => write!(f, "{err}"),
            Self::Candidate(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Failed(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ActionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Reconcile(err) => Some(err),
            Self::Candidate(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Failed(_) => None,
        }
    }
}

impl From<ReconcileError> for ActionError {
    fn from(value: ReconcileError) -> Self {
        Self::Reconcile(value)
    }
}

impl From<CandidateRepoError> for ActionError {
    fn from(value: CandidateRepoError) -> Self {
        Self::Candidate(value)
    }
}

impl From<StoreError> for ActionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// The composable guard chain in front of every mutation.
#[derive(Debug, Clone, Copy)]
pub struct MutationPipeline {
    mode: ExecutionMode,
}

impl MutationPipeline {
    /// Creates a pipeline with the given failure detail policy.
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }

    /// Runs one mutation through the full stage chain.
    ///
    /// `store` serves the read-only guard stages and is handed back to the
    /// action body for its own repositories. `raw` is the caller payload; the
    /// team id is read from its `team_id` field before schema validation.
    ///
    /// # Stage order (fixed)
    /// 1. identity resolution — `Unauthenticated`
    /// 2. team ownership — `MissingTeamId` / `TeamNotFound` / `Forbidden`
    /// 3. schema validation — `ValidationFailed`
    /// 4. action body — `ActionFailed`
    pub fn mutate<S, P, T, F>(
        &self,
        store: &mut S,
        action_name: &str,
        session_token: Option<&str>,
        raw: &Value,
        action: F,
    ) -> Result<T, PipelineFailure>
    where
        S: IdentityStore + TeamStore,
        P: MutationPayload,
        F: FnOnce(&mut S, &MutationContext, P) -> Result<T, ActionError>,
    {
        let identity = self.require_identity(store, action_name, session_token)?;
        let team = self.require_team_ownership(store, action_name, raw, identity)?;

        let payload = P::parse(raw).map_err(|errors| {
            info!(
                "event=mutation module=pipeline status=denied action={action_name} reason=validation_failed fields={}",
                errors.len()
            );
            PipelineFailure::ValidationFailed(errors)
        })?;

        let context = MutationContext { identity, team };
        match action(store, &context, payload) {
            Ok(output) => {
                info!(
                    "event=mutation module=pipeline status=ok action={action_name} user={} team={}",
                    context.identity.user_id, context.team.uuid
                );
                Ok(output)
            }
            Err(err) => {
                warn!(
                    "event=mutation module=pipeline status=error action={action_name} user={} team={} error={err}",
                    context.identity.user_id, context.team.uuid
                );
                Err(self.action_failure(err))
            }
        }
    }

    fn require_identity<S: IdentityStore>(
        &self,
        store: &mut S,
        action_name: &str,
        session_token: Option<&str>,
    ) -> Result<Identity, PipelineFailure> {
        let Some(token) = session_token.filter(|token| !token.trim().is_empty()) else {
            info!(
                "event=mutation module=pipeline status=denied action={action_name} reason=unauthenticated"
            );
            return Err(PipelineFailure::Unauthenticated);
        };

        match store.resolve_identity(token) {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => {
                info!(
                    "event=mutation module=pipeline status=denied action={action_name} reason=unauthenticated"
                );
                Err(PipelineFailure::Unauthenticated)
            }
            Err(err) => Err(self.internal_failure(action_name, "session lookup failed", &err)),
        }
    }

    fn require_team_ownership<S: TeamStore>(
        &self,
        store: &mut S,
        action_name: &str,
        raw: &Value,
        identity: Identity,
    ) -> Result<Team, PipelineFailure> {
        let team_id = match extract_team_id(raw) {
            Ok(team_id) => team_id,
            Err(failure) => {
                info!(
                    "event=mutation module=pipeline status=denied action={action_name} reason={}",
                    denial_reason(&failure)
                );
                return Err(failure);
            }
        };

        let team = match store.load_team(team_id) {
            Ok(Some(team)) => team,
            Ok(None) => {
                info!(
                    "event=mutation module=pipeline status=denied action={action_name} reason=team_not_found team={team_id}"
                );
                return Err(PipelineFailure::TeamNotFound);
            }
            Err(err) => {
                return Err(self.internal_failure(action_name, "team lookup failed", &err))
            }
        };

        // Soft-deleted teams are indistinguishable from missing ones.
        if !team.is_active() {
            info!(
                "event=mutation module=pipeline status=denied action={action_name} reason=team_not_found team={team_id}"
            );
            return Err(PipelineFailure::TeamNotFound);
        }

        let allowed = identity.role == Role::Admin
            || team.owner_user_uuid == identity.user_id
            || store
                .is_team_member(team_id, identity.user_id)
                .map_err(|err| self.internal_failure(action_name, "membership lookup failed", &err))?;

        if !allowed {
            info!(
                "event=mutation module=pipeline status=denied action={action_name} reason=forbidden user={} team={team_id}",
                identity.user_id
            );
            return Err(PipelineFailure::Forbidden);
        }

        Ok(team)
    }

    fn action_failure(&self, err: ActionError) -> PipelineFailure {
        match err {
            ActionError::Reconcile(ReconcileError::DuplicateName { field }) => {
                PipelineFailure::ActionFailed {
                    message: format!("value for `{field}` is already in use"),
                    field: Some(field),
                }
            }
            // Typed reconciliation failures keep their specific user-facing
            // message in both modes.
            ActionError::Reconcile(
                err @ (ReconcileError::ParentNotFound(_)
                | ReconcileError::StaleReference(_)
                | ReconcileError::DuplicateTargetId(_)),
            ) => PipelineFailure::ActionFailed {
                message: err.to_string(),
                field: None,
            },
            ActionError::Candidate(CandidateRepoError::NotFound(_)) => {
                PipelineFailure::ActionFailed {
                    message: "candidate not found for this team".to_string(),
                    field: None,
                }
            }
            other => PipelineFailure::ActionFailed {
                message: self.redacted("the request could not be completed", &other),
                field: None,
            },
        }
    }

    fn internal_failure(
        &self,
        action_name: &str,
        summary: &str,
        err: &dyn Display,
    ) -> PipelineFailure {
        warn!(
            "event=mutation module=pipeline status=error action={action_name} error_code=store_failed error={err}"
        );
        PipelineFailure::Internal(self.redacted(summary, err))
    }

    fn redacted(&self, generic: &str, detail: &dyn Display) -> String {
        match self.mode {
            ExecutionMode::Development => format!("{generic}: {detail}"),
            ExecutionMode::Production => generic.to_string(),
        }
    }
}

/// Reads the claimed team id from the raw payload.
///
/// Absence (missing key, `null`, non-string, empty string) is
/// `MissingTeamId`; a present but malformed id cannot name any team and is
/// `TeamNotFound`.
fn extract_team_id(raw: &Value) -> Result<TeamId, PipelineFailure> {
    let text = raw
        .get("team_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(PipelineFailure::MissingTeamId)?;

    Uuid::parse_str(text).map_err(|_| PipelineFailure::TeamNotFound)
}

fn denial_reason(failure: &PipelineFailure) -> &'static str {
    match failure {
        PipelineFailure::Unauthenticated => "unauthenticated",
        PipelineFailure::MissingTeamId => "missing_team_id",
        PipelineFailure::TeamNotFound => "team_not_found",
        PipelineFailure::Forbidden => "forbidden",
        PipelineFailure::ValidationFailed(_) => "validation_failed",
        PipelineFailure::ActionFailed { .. } => "action_failed",
        PipelineFailure::Internal(_) => "internal",
    }
}
