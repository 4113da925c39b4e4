//! Candidate aggregate repository: contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide team-scoped CRUD APIs for candidate rows.
//! - Reconcile the owned skill collection with the shared diff engine.
//!
//! # Invariants
//! - Candidate reads/writes are constrained to the owning team.
//! - Skill reconciliation runs in its own immediate transaction; the caller
//!   decides whether a skill-sync failure rolls anything back (by design the
//!   candidate write does not).
//! - Absent patch fields are left unchanged, never cleared.

use crate::db::DbError;
use crate::model::candidate::{
    parse_status, status_to_db, Candidate, CandidateId, CandidateSkill, CandidateStatus, SkillId,
};
use crate::model::team::TeamId;
use crate::reconcile::{
    diff_children, map_apply_error, ChildDiff, ChildPatch, ReconcileError, ReconcileResult,
    ReconciliationSummary, TargetChild,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type CandidateRepoResult<T> = Result<T, CandidateRepoError>;

/// Errors from candidate row persistence.
#[derive(Debug)]
pub enum CandidateRepoError {
    Db(DbError),
    /// No candidate with this id belongs to the scoped team.
    NotFound(CandidateId),
    InvalidData(String),
}

impl Display for CandidateRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "candidate not found: {id}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted candidate data: {message}")
            }
        }
    }
}

impl Error for CandidateRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for CandidateRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CandidateRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Caller-supplied fields for one skill entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkillPatch {
    pub name: Option<String>,
    pub level: Option<String>,
}

impl ChildPatch for SkillPatch {
    type Stored = CandidateSkill;

    fn is_noop_on(&self, stored: &CandidateSkill) -> bool {
        let name_same = self.name.as_ref().map_or(true, |name| *name == stored.name);
        let level_same = self
            .level
            .as_ref()
            .map_or(true, |level| stored.level.as_deref() == Some(level.as_str()));
        name_same && level_same
    }
}

/// Full shape for creating a candidate row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateDraft {
    pub team_uuid: TeamId,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: CandidateStatus,
    pub notes: Option<String>,
}

/// Caller-supplied fields for patching a candidate row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidatePatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<CandidateStatus>,
    pub notes: Option<String>,
}

impl CandidatePatch {
    fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.status.is_none()
            && self.notes.is_none()
    }
}

/// Repository interface for candidate rows and their skill collection.
pub trait CandidateRepository {
    /// Creates one candidate and returns its stable id.
    fn create_candidate(&mut self, draft: &CandidateDraft) -> CandidateRepoResult<CandidateId>;
    /// Patches one candidate row, scoped to the owning team.
    fn update_candidate(
        &mut self,
        team_id: TeamId,
        candidate_id: CandidateId,
        patch: &CandidatePatch,
    ) -> CandidateRepoResult<()>;
    /// Loads one candidate scoped to the owning team.
    fn get_candidate(
        &self,
        team_id: TeamId,
        candidate_id: CandidateId,
    ) -> CandidateRepoResult<Option<Candidate>>;
    /// Lists persisted skills of one candidate, name ascending.
    fn list_skills(&self, candidate_id: CandidateId) -> CandidateRepoResult<Vec<CandidateSkill>>;
    /// Reconciles the candidate's skill collection against the target list in
    /// one transaction. Returns the applied operation counts.
    fn replace_skills(
        &mut self,
        candidate_id: CandidateId,
        target: Vec<TargetChild<SkillPatch>>,
    ) -> ReconcileResult<ReconciliationSummary>;
}

/// SQLite-backed candidate repository.
pub struct SqliteCandidateRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteCandidateRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }
}

impl CandidateRepository for SqliteCandidateRepository<'_> {
    fn create_candidate(&mut self, draft: &CandidateDraft) -> CandidateRepoResult<CandidateId> {
        let candidate_id = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO candidates (uuid, team_uuid, full_name, email, phone, status, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                candidate_id.to_string(),
                draft.team_uuid.to_string(),
                draft.full_name.as_str(),
                draft.email.as_deref(),
                draft.phone.as_deref(),
                status_to_db(draft.status),
                draft.notes.as_deref(),
            ],
        )?;
        Ok(candidate_id)
    }

    fn update_candidate(
        &mut self,
        team_id: TeamId,
        candidate_id: CandidateId,
        patch: &CandidatePatch,
    ) -> CandidateRepoResult<()> {
        if patch.is_empty() {
            // Still surface not-found for a candidate outside the team.
            return match self.get_candidate(team_id, candidate_id)? {
                Some(_) => Ok(()),
                None => Err(CandidateRepoError::NotFound(candidate_id)),
            };
        }

        let mut sets = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(full_name) = &patch.full_name {
            sets.push("full_name = ?");
            bind_values.push(Value::Text(full_name.clone()));
        }
        if let Some(email) = &patch.email {
            sets.push("email = ?");
            bind_values.push(Value::Text(email.clone()));
        }
        if let Some(phone) = &patch.phone {
            sets.push("phone = ?");
            bind_values.push(Value::Text(phone.clone()));
        }
        if let Some(status) = patch.status {
            sets.push("status = ?");
            bind_values.push(Value::Text(status_to_db(status).to_string()));
        }
        if let Some(notes) = &patch.notes {
            sets.push("notes = ?");
            bind_values.push(Value::Text(notes.clone()));
        }

        let sql = format!(
            "UPDATE candidates
             SET {}, updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ? AND team_uuid = ?;",
            sets.join(", ")
        );
        bind_values.push(Value::Text(candidate_id.to_string()));
        bind_values.push(Value::Text(team_id.to_string()));

        let changed = self.conn.execute(&sql, params_from_iter(bind_values))?;
        if changed == 0 {
            return Err(CandidateRepoError::NotFound(candidate_id));
        }

        Ok(())
    }

    fn get_candidate(
        &self,
        team_id: TeamId,
        candidate_id: CandidateId,
    ) -> CandidateRepoResult<Option<Candidate>> {
        self.conn
            .query_row(
                "SELECT uuid, team_uuid, full_name, email, phone, status, notes
                 FROM candidates
                 WHERE uuid = ?1 AND team_uuid = ?2;",
                params![candidate_id.to_string(), team_id.to_string()],
                parse_candidate_row,
            )
            .optional()?
            .transpose()
    }

    fn list_skills(&self, candidate_id: CandidateId) -> CandidateRepoResult<Vec<CandidateSkill>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, candidate_uuid, name, level
             FROM candidate_skills
             WHERE candidate_uuid = ?1
             ORDER BY name ASC, uuid ASC;",
        )?;

        let mut rows = stmt.query([candidate_id.to_string()])?;
        let mut skills = Vec::new();
        while let Some(row) = rows.next()? {
            skills.push(parse_skill_row(row)?);
        }

        Ok(skills)
    }

    fn replace_skills(
        &mut self,
        candidate_id: CandidateId,
        target: Vec<TargetChild<SkillPatch>>,
    ) -> ReconcileResult<ReconciliationSummary> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_apply_error)?;

        if !candidate_exists_in_tx(&tx, candidate_id).map_err(map_apply_error)? {
            return Err(ReconcileError::ParentNotFound(candidate_id));
        }

        let existing = load_skill_map(&tx, candidate_id)?;
        let diff = diff_children(&existing, target)?;
        let summary = ReconciliationSummary::from(&diff);

        apply_skill_diff(&tx, candidate_id, diff).map_err(map_apply_error)?;

        tx.commit().map_err(map_apply_error)?;
        Ok(summary)
    }
}

fn candidate_exists_in_tx(
    tx: &Transaction<'_>,
    candidate_id: CandidateId,
) -> rusqlite::Result<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM candidates WHERE uuid = ?1);",
        [candidate_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn load_skill_map(
    tx: &Transaction<'_>,
    candidate_id: CandidateId,
) -> ReconcileResult<BTreeMap<SkillId, CandidateSkill>> {
    let mut stmt = tx
        .prepare(
            "SELECT uuid, candidate_uuid, name, level
             FROM candidate_skills
             WHERE candidate_uuid = ?1;",
        )
        .map_err(map_apply_error)?;

    let mut rows = stmt
        .query([candidate_id.to_string()])
        .map_err(map_apply_error)?;
    let mut existing = BTreeMap::new();
    while let Some(row) = rows.next().map_err(map_apply_error)? {
        let skill = parse_skill_row(row)
            .map_err(|err| ReconcileError::InvalidData(err.to_string()))?;
        existing.insert(skill.uuid, skill);
    }

    Ok(existing)
}

fn apply_skill_diff(
    tx: &Transaction<'_>,
    candidate_id: CandidateId,
    diff: ChildDiff<SkillPatch>,
) -> rusqlite::Result<()> {
    for skill_id in &diff.to_delete {
        tx.execute(
            "DELETE FROM candidate_skills WHERE uuid = ?1 AND candidate_uuid = ?2;",
            params![skill_id.to_string(), candidate_id.to_string()],
        )?;
    }

    for (skill_id, patch) in &diff.to_update {
        apply_skill_update(tx, *skill_id, patch)?;
    }

    for patch in &diff.to_add {
        tx.execute(
            "INSERT INTO candidate_skills (uuid, candidate_uuid, name, level)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                Uuid::new_v4().to_string(),
                candidate_id.to_string(),
                patch.name.as_deref(),
                patch.level.as_deref(),
            ],
        )?;
    }

    Ok(())
}

fn apply_skill_update(
    tx: &Transaction<'_>,
    skill_id: SkillId,
    patch: &SkillPatch,
) -> rusqlite::Result<()> {
    let mut sets = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(name) = &patch.name {
        sets.push("name = ?");
        bind_values.push(Value::Text(name.clone()));
    }
    if let Some(level) = &patch.level {
        sets.push("level = ?");
        bind_values.push(Value::Text(level.clone()));
    }

    if sets.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "UPDATE candidate_skills
         SET {}, updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?;",
        sets.join(", ")
    );
    bind_values.push(Value::Text(skill_id.to_string()));

    tx.execute(&sql, params_from_iter(bind_values))?;
    Ok(())
}

fn parse_candidate_row(row: &Row<'_>) -> rusqlite::Result<CandidateRepoResult<Candidate>> {
    let uuid_text: String = row.get("uuid")?;
    let team_text: String = row.get("team_uuid")?;
    let status_text: String = row.get("status")?;
    let full_name: String = row.get("full_name")?;
    let email: Option<String> = row.get("email")?;
    let phone: Option<String> = row.get("phone")?;
    let notes: Option<String> = row.get("notes")?;

    Ok((|| -> CandidateRepoResult<Candidate> {
        let uuid = parse_uuid(&uuid_text, "candidates.uuid")?;
        let team_uuid = parse_uuid(&team_text, "candidates.team_uuid")?;
        let status = parse_status(&status_text).ok_or_else(|| {
            CandidateRepoError::InvalidData(format!(
                "invalid status value `{status_text}` in candidates.status"
            ))
        })?;

        Ok(Candidate {
            uuid,
            team_uuid,
            full_name,
            email,
            phone,
            status,
            notes,
        })
    })())
}

fn parse_skill_row(row: &Row<'_>) -> CandidateRepoResult<CandidateSkill> {
    let uuid_text: String = row.get("uuid")?;
    let candidate_text: String = row.get("candidate_uuid")?;

    Ok(CandidateSkill {
        uuid: parse_uuid(&uuid_text, "candidate_skills.uuid")?,
        candidate_uuid: parse_uuid(&candidate_text, "candidate_skills.candidate_uuid")?,
        name: row.get("name")?,
        level: row.get("level")?,
    })
}

fn parse_uuid(value: &str, column: &str) -> CandidateRepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        CandidateRepoError::InvalidData(format!("invalid uuid value `{value}` in {column}"))
    })
}
