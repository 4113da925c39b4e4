//! Topic aggregate repository: contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence APIs for the topic/subtopic aggregate.
//! - Apply reconciliation diffs transactionally in delete→update→add order.
//!
//! # Invariants
//! - Every write path runs inside one immediate transaction; a failure
//!   partway through leaves the aggregate untouched.
//! - Deletion is applied first so a name moving from a removed child to a new
//!   one never trips the `(topic_uuid, name)` unique index mid-apply.
//! - Absent patch fields are left unchanged, never cleared.
//! - Uniqueness is enforced by the database; violations are surfaced as
//!   `DuplicateName`, not re-checked in application code.

use crate::model::topic::{Subtopic, SubtopicId, Topic, TopicId};
use crate::reconcile::{
    diff_children, map_apply_error, ChildDiff, ChildPatch, ReconcileError, ReconcileResult,
    ReconciliationSummary, TargetChild,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Caller-supplied fields for one subtopic.
///
/// `None` means "leave unchanged" on update and "unset" on insert; inserts
/// require `name` (the schema rejects a missing one).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtopicPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl ChildPatch for SubtopicPatch {
    type Stored = Subtopic;

    fn is_noop_on(&self, stored: &Subtopic) -> bool {
        let name_same = self.name.as_ref().map_or(true, |name| *name == stored.name);
        let description_same = self
            .description
            .as_ref()
            .map_or(true, |description| {
                stored.description.as_deref() == Some(description.as_str())
            });
        name_same && description_same
    }
}

/// Caller-supplied fields for the parent topic row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

impl TopicPatch {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.category.is_none()
    }
}

/// Full shape for creating a topic with its initial children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDraft {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subtopics: Vec<SubtopicPatch>,
}

/// Repository interface for the topic/subtopic aggregate.
///
/// The whole aggregate shares the reconciliation failure taxonomy:
/// `ParentNotFound` covers missing topics and `DuplicateName` covers every
/// uniqueness conflict.
pub trait TopicRepository {
    /// Creates one topic with its initial subtopics and returns it.
    fn create_topic(&mut self, draft: &TopicDraft) -> ReconcileResult<Topic>;
    /// Patches the topic row and reconciles its child collection in one
    /// transaction. Returns the applied operation counts.
    fn update_topic(
        &mut self,
        topic_id: TopicId,
        patch: &TopicPatch,
        target: Vec<TargetChild<SubtopicPatch>>,
    ) -> ReconcileResult<ReconciliationSummary>;
    /// Hard-deletes one topic; subtopics cascade.
    fn delete_topic(&mut self, topic_id: TopicId) -> ReconcileResult<()>;
    /// Loads one topic by id.
    fn get_topic(&self, topic_id: TopicId) -> ReconcileResult<Option<Topic>>;
    /// Lists the persisted children of one topic, name ascending.
    fn list_subtopics(&self, topic_id: TopicId) -> ReconcileResult<Vec<Subtopic>>;
}

/// SQLite-backed topic repository.
pub struct SqliteTopicRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteTopicRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }
}

impl TopicRepository for SqliteTopicRepository<'_> {
    fn create_topic(&mut self, draft: &TopicDraft) -> ReconcileResult<Topic> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_apply_error)?;

        let topic = Topic {
            uuid: Uuid::new_v4(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            category: draft.category.clone(),
        };

        tx.execute(
            "INSERT INTO topics (uuid, name, description, category)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                topic.uuid.to_string(),
                topic.name.as_str(),
                topic.description.as_deref(),
                topic.category.as_deref(),
            ],
        )
        .map_err(map_apply_error)?;

        for patch in &draft.subtopics {
            insert_subtopic(&tx, topic.uuid, patch).map_err(map_apply_error)?;
        }

        tx.commit().map_err(map_apply_error)?;
        Ok(topic)
    }

    fn update_topic(
        &mut self,
        topic_id: TopicId,
        patch: &TopicPatch,
        target: Vec<TargetChild<SubtopicPatch>>,
    ) -> ReconcileResult<ReconciliationSummary> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_apply_error)?;

        if !topic_exists_in_tx(&tx, topic_id).map_err(map_apply_error)? {
            return Err(ReconcileError::ParentNotFound(topic_id));
        }

        if !patch.is_empty() {
            apply_topic_patch(&tx, topic_id, patch).map_err(map_apply_error)?;
        }

        let existing = load_subtopic_map(&tx, topic_id)?;
        let diff = diff_children(&existing, target)?;
        let summary = ReconciliationSummary::from(&diff);

        apply_subtopic_diff(&tx, topic_id, diff).map_err(map_apply_error)?;

        tx.commit().map_err(map_apply_error)?;
        Ok(summary)
    }

    fn delete_topic(&mut self, topic_id: TopicId) -> ReconcileResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM topics WHERE uuid = ?1;", [topic_id.to_string()])
            .map_err(map_apply_error)?;

        if changed == 0 {
            return Err(ReconcileError::ParentNotFound(topic_id));
        }

        Ok(())
    }

    fn get_topic(&self, topic_id: TopicId) -> ReconcileResult<Option<Topic>> {
        self.conn
            .query_row(
                "SELECT uuid, name, description, category
                 FROM topics
                 WHERE uuid = ?1;",
                [topic_id.to_string()],
                parse_topic_row,
            )
            .optional()
            .map_err(map_apply_error)?
            .transpose()
    }

    fn list_subtopics(&self, topic_id: TopicId) -> ReconcileResult<Vec<Subtopic>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT uuid, topic_uuid, name, description
                 FROM subtopics
                 WHERE topic_uuid = ?1
                 ORDER BY name ASC, uuid ASC;",
            )
            .map_err(map_apply_error)?;

        let mut rows = stmt
            .query([topic_id.to_string()])
            .map_err(map_apply_error)?;
        let mut subtopics = Vec::new();
        while let Some(row) = rows.next().map_err(map_apply_error)? {
            subtopics.push(parse_subtopic_row(row)?);
        }

        Ok(subtopics)
    }
}

fn topic_exists_in_tx(tx: &Transaction<'_>, topic_id: TopicId) -> rusqlite::Result<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM topics WHERE uuid = ?1);",
        [topic_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn apply_topic_patch(
    tx: &Transaction<'_>,
    topic_id: TopicId,
    patch: &TopicPatch,
) -> rusqlite::Result<()> {
    let mut sets = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(name) = &patch.name {
        sets.push("name = ?");
        bind_values.push(Value::Text(name.clone()));
    }
    if let Some(description) = &patch.description {
        sets.push("description = ?");
        bind_values.push(Value::Text(description.clone()));
    }
    if let Some(category) = &patch.category {
        sets.push("category = ?");
        bind_values.push(Value::Text(category.clone()));
    }

    let sql = format!(
        "UPDATE topics
         SET {}, updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?;",
        sets.join(", ")
    );
    bind_values.push(Value::Text(topic_id.to_string()));

    tx.execute(&sql, params_from_iter(bind_values))?;
    Ok(())
}

fn load_subtopic_map(
    tx: &Transaction<'_>,
    topic_id: TopicId,
) -> ReconcileResult<BTreeMap<SubtopicId, Subtopic>> {
    let mut stmt = tx
        .prepare(
            "SELECT uuid, topic_uuid, name, description
             FROM subtopics
             WHERE topic_uuid = ?1;",
        )
        .map_err(map_apply_error)?;

    let mut rows = stmt
        .query([topic_id.to_string()])
        .map_err(map_apply_error)?;
    let mut existing = BTreeMap::new();
    while let Some(row) = rows.next().map_err(map_apply_error)? {
        let subtopic = parse_subtopic_row(row)?;
        existing.insert(subtopic.uuid, subtopic);
    }

    Ok(existing)
}

fn apply_subtopic_diff(
    tx: &Transaction<'_>,
    topic_id: TopicId,
    diff: ChildDiff<SubtopicPatch>,
) -> rusqlite::Result<()> {
    for subtopic_id in &diff.to_delete {
        tx.execute(
            "DELETE FROM subtopics WHERE uuid = ?1 AND topic_uuid = ?2;",
            params![subtopic_id.to_string(), topic_id.to_string()],
        )?;
    }

    for (subtopic_id, patch) in &diff.to_update {
        apply_subtopic_update(tx, *subtopic_id, patch)?;
    }

    for patch in &diff.to_add {
        insert_subtopic(tx, topic_id, patch)?;
    }

    Ok(())
}

fn apply_subtopic_update(
    tx: &Transaction<'_>,
    subtopic_id: SubtopicId,
    patch: &SubtopicPatch,
) -> rusqlite::Result<()> {
    let mut sets = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(name) = &patch.name {
        sets.push("name = ?");
        bind_values.push(Value::Text(name.clone()));
    }
    if let Some(description) = &patch.description {
        sets.push("description = ?");
        bind_values.push(Value::Text(description.clone()));
    }

    // The diff never emits a field-free update, but guard anyway.
    if sets.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "UPDATE subtopics
         SET {}, updated_at = (strftime('%s', 'now') * 1000)
         WHERE uuid = ?;",
        sets.join(", ")
    );
    bind_values.push(Value::Text(subtopic_id.to_string()));

    tx.execute(&sql, params_from_iter(bind_values))?;
    Ok(())
}

fn insert_subtopic(
    tx: &Transaction<'_>,
    topic_id: TopicId,
    patch: &SubtopicPatch,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO subtopics (uuid, topic_uuid, name, description)
         VALUES (?1, ?2, ?3, ?4);",
        params![
            Uuid::new_v4().to_string(),
            topic_id.to_string(),
            patch.name.as_deref(),
            patch.description.as_deref(),
        ],
    )?;
    Ok(())
}

fn parse_topic_row(row: &Row<'_>) -> rusqlite::Result<ReconcileResult<Topic>> {
    let uuid_text: String = row.get("uuid")?;
    let name: String = row.get("name")?;
    let description: Option<String> = row.get("description")?;
    let category: Option<String> = row.get("category")?;

    Ok(match parse_uuid(&uuid_text, "topics.uuid") {
        Ok(uuid) => Ok(Topic {
            uuid,
            name,
            description,
            category,
        }),
        Err(err) => Err(err),
    })
}

fn parse_subtopic_row(row: &Row<'_>) -> ReconcileResult<Subtopic> {
    let uuid_text: String = row.get("uuid").map_err(map_apply_error)?;
    let topic_text: String = row.get("topic_uuid").map_err(map_apply_error)?;

    Ok(Subtopic {
        uuid: parse_uuid(&uuid_text, "subtopics.uuid")?,
        topic_uuid: parse_uuid(&topic_text, "subtopics.topic_uuid")?,
        name: row.get("name").map_err(map_apply_error)?,
        description: row.get("description").map_err(map_apply_error)?,
    })
}

fn parse_uuid(value: &str, column: &str) -> ReconcileResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| ReconcileError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
