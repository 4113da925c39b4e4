//! Topic use-case service.
//!
//! # Responsibility
//! - Expose create/update/delete entry points for the topic aggregate.
//! - Run every entry point through the full mutation pipeline before any
//!   repository work.
//!
//! # Invariants
//! - The team id in the payload authorizes the mutation but is never stored
//!   on the topic.
//! - `update_topic` interprets the subtopic list literally as the full
//!   desired state; an empty list deletes every child.

use crate::pipeline::payload::{
    as_object, optional_array, optional_string, require_string, require_uuid, FieldError,
    MutationPayload,
};
use crate::pipeline::{ActionError, MutationPipeline, PipelineFailure};
use crate::reconcile::{ReconciliationSummary, TargetChild};
use crate::repo::topic_repo::{
    SqliteTopicRepository, SubtopicPatch, TopicDraft, TopicPatch, TopicRepository,
};
use crate::repo::SqliteMutationStore;
use crate::model::topic::TopicId;
use rusqlite::Connection;
use serde_json::Value;

const NAME_MAX_CHARS: usize = 120;
const DESCRIPTION_MAX_CHARS: usize = 2000;
const CATEGORY_MAX_CHARS: usize = 60;

/// Result of one topic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicMutationOutput {
    /// The affected topic.
    pub topic_id: TopicId,
    /// Child operation counts applied by this mutation.
    pub subtopics: ReconciliationSummary,
}

/// Request model for creating a topic with initial subtopics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTopicPayload {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub subtopics: Vec<SubtopicPatch>,
}

impl MutationPayload for CreateTopicPayload {
    fn parse(raw: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let Some(obj) = as_object(raw, &mut errors) else {
            return Err(errors);
        };

        let name = require_string(obj, "name", NAME_MAX_CHARS, &mut errors);
        let description = optional_string(obj, "description", DESCRIPTION_MAX_CHARS, &mut errors);
        let category = optional_string(obj, "category", CATEGORY_MAX_CHARS, &mut errors);

        let mut subtopics = Vec::new();
        if let Some(items) = optional_array(obj, "subtopics", &mut errors) {
            for (index, item) in items.iter().enumerate() {
                if let Some(entry) = parse_subtopic_entry(item, index, false, &mut errors) {
                    subtopics.push(entry.patch);
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            // `name` is always present when no error was recorded for it.
            name: name.unwrap_or_default(),
            description,
            category,
            subtopics,
        })
    }
}

/// Request model for updating a topic and reconciling its subtopics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTopicPayload {
    pub topic_id: TopicId,
    pub patch: TopicPatch,
    /// Full desired child state, echoed persisted ids included.
    pub subtopics: Vec<TargetChild<SubtopicPatch>>,
}

impl MutationPayload for UpdateTopicPayload {
    fn parse(raw: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let Some(obj) = as_object(raw, &mut errors) else {
            return Err(errors);
        };

        let topic_id = require_uuid(obj, "topic_id", &mut errors);
        let patch = TopicPatch {
            name: optional_string(obj, "name", NAME_MAX_CHARS, &mut errors),
            description: optional_string(obj, "description", DESCRIPTION_MAX_CHARS, &mut errors),
            category: optional_string(obj, "category", CATEGORY_MAX_CHARS, &mut errors),
        };

        // The caller must always echo the full desired child state; `null`
        // is not an empty list and never means "delete all".
        let mut subtopics = Vec::new();
        match obj.get("subtopics") {
            None => errors.push(FieldError::new("subtopics", "is required")),
            Some(Value::Array(items)) => {
                for (index, item) in items.iter().enumerate() {
                    if let Some(entry) = parse_subtopic_entry(item, index, true, &mut errors) {
                        subtopics.push(entry);
                    }
                }
            }
            Some(_) => errors.push(FieldError::new("subtopics", "must be a list")),
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            topic_id: topic_id.unwrap_or_default(),
            patch,
            subtopics,
        })
    }
}

/// Request model for deleting a topic (children cascade).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteTopicPayload {
    pub topic_id: TopicId,
}

impl MutationPayload for DeleteTopicPayload {
    fn parse(raw: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let Some(obj) = as_object(raw, &mut errors) else {
            return Err(errors);
        };

        let topic_id = require_uuid(obj, "topic_id", &mut errors);

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            topic_id: topic_id.unwrap_or_default(),
        })
    }
}

fn parse_subtopic_entry(
    value: &Value,
    index: usize,
    allow_ids: bool,
    errors: &mut Vec<FieldError>,
) -> Option<TargetChild<SubtopicPatch>> {
    let field = |name: &str| format!("subtopics[{index}].{name}");

    let Some(obj) = value.as_object() else {
        errors.push(FieldError::new(
            format!("subtopics[{index}]"),
            "must be an object",
        ));
        return None;
    };

    let before = errors.len();
    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => match uuid::Uuid::parse_str(text.trim()) {
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
            "must not be set when creating a topic",
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
            } else if trimmed.chars().count() > NAME_MAX_CHARS {
                errors.push(FieldError::new(
                    field("name"),
                    format!("must be at most {NAME_MAX_CHARS} characters"),
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

    let description = match obj.get("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            if trimmed.chars().count() > DESCRIPTION_MAX_CHARS {
                errors.push(FieldError::new(
                    field("description"),
                    format!("must be at most {DESCRIPTION_MAX_CHARS} characters"),
                ));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(_) => {
            errors.push(FieldError::new(field("description"), "must be a string"));
            None
        }
    };

    if errors.len() > before {
        return None;
    }

    Some(TargetChild {
        id,
        patch: SubtopicPatch { name, description },
    })
}

/// Use-case service for topic mutations.
pub struct TopicAdminService {
    pipeline: MutationPipeline,
}

impl TopicAdminService {
    /// Creates a service running mutations through the given pipeline.
    pub fn new(pipeline: MutationPipeline) -> Self {
        Self { pipeline }
    }

    /// Creates one topic with its initial subtopics.
    pub fn create_topic(
        &self,
        conn: &mut Connection,
        session_token: Option<&str>,
        raw: &Value,
    ) -> Result<TopicMutationOutput, PipelineFailure> {
        let mut store = SqliteMutationStore::new(conn);
        self.pipeline.mutate(
            &mut store,
            "topic_create",
            session_token,
            raw,
            |store, _context, payload: CreateTopicPayload| {
                let mut repo = SqliteTopicRepository::new(store.connection());
                let added = payload.subtopics.len();
                let topic = repo.create_topic(&TopicDraft {
                    name: payload.name,
                    description: payload.description,
                    category: payload.category,
                    subtopics: payload.subtopics,
                })?;
                Ok(TopicMutationOutput {
                    topic_id: topic.uuid,
                    subtopics: ReconciliationSummary {
                        added,
                        ..ReconciliationSummary::default()
                    },
                })
            },
        )
    }

    /// Patches one topic and reconciles its subtopic collection.
    pub fn update_topic(
        &self,
        conn: &mut Connection,
        session_token: Option<&str>,
        raw: &Value,
    ) -> Result<TopicMutationOutput, PipelineFailure> {
        let mut store = SqliteMutationStore::new(conn);
        self.pipeline.mutate(
            &mut store,
            "topic_update",
            session_token,
            raw,
            |store, _context, payload: UpdateTopicPayload| {
                let mut repo = SqliteTopicRepository::new(store.connection());
                let summary =
                    repo.update_topic(payload.topic_id, &payload.patch, payload.subtopics)?;
                Ok(TopicMutationOutput {
                    topic_id: payload.topic_id,
                    subtopics: summary,
                })
            },
        )
    }

    /// Deletes one topic; its subtopics cascade at the database level.
    pub fn delete_topic(
        &self,
        conn: &mut Connection,
        session_token: Option<&str>,
        raw: &Value,
    ) -> Result<TopicMutationOutput, PipelineFailure> {
        let mut store = SqliteMutationStore::new(conn);
        self.pipeline.mutate(
            &mut store,
            "topic_delete",
            session_token,
            raw,
            |store, _context, payload: DeleteTopicPayload| {
                let mut repo = SqliteTopicRepository::new(store.connection());
                repo.delete_topic(payload.topic_id).map_err(ActionError::from)?;
                Ok(TopicMutationOutput {
                    topic_id: payload.topic_id,
                    subtopics: ReconciliationSummary::default(),
                })
            },
        )
    }
}
