//! Topic/subtopic aggregate model.
//!
//! # Responsibility
//! - Define the parent record and its owned child collection.
//!
//! # Invariants
//! - `Topic::name` is unique across all topics (database-enforced).
//! - Every persisted subtopic references an existing topic; deleting a topic
//!   cascades deletion of its subtopics.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable topic identifier.
pub type TopicId = Uuid;

/// Stable subtopic identifier.
pub type SubtopicId = Uuid;

/// Parent entity of the topic/subtopic aggregate.
///
/// Globally scoped: the action boundary always carries a team id, but it is
/// used only for authorization and never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Stable topic id.
    pub uuid: TopicId,
    /// Unique topic name.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Optional grouping category.
    pub category: Option<String>,
}

/// Persisted child entity owned by one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtopic {
    /// Stable subtopic id.
    pub uuid: SubtopicId,
    /// Owning topic id.
    pub topic_uuid: TopicId,
    /// Subtopic name, unique within its topic.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
}
