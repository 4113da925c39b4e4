//! Child-collection reconciliation engine.
//!
//! # Responsibility
//! - Diff a caller-supplied target child list against the persisted child set
//!   into disjoint delete/update/add operation sets.
//! - Map SQLite constraint violations back to field-level failures.
//!
//! # Invariants
//! - The diff is pure: it touches no storage and depends only on its inputs.
//! - A target id unknown to the persisted set fails the whole diff
//!   (`StaleReference`); stale ids are never silently re-inserted as new.
//! - Matched ids whose supplied fields equal stored state emit no update, so
//!   repeating a reconciliation with an id-complete identical target yields
//!   an empty diff.
//! - Apply order is delete, then update, then add, inside one transaction.

use crate::db::DbError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type used by reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors from computing or applying a reconciliation.
#[derive(Debug)]
pub enum ReconcileError {
    /// Parent entity does not exist.
    ParentNotFound(Uuid),
    /// Target child id is not in the persisted set.
    StaleReference(Uuid),
    /// The same persisted child id appears twice in the target list.
    DuplicateTargetId(Uuid),
    /// A database uniqueness constraint rejected the apply.
    DuplicateName {
        /// Offending column when the constraint name is recognizable.
        field: String,
    },
    /// Apply failed and was rolled back for a non-constraint reason.
    Transaction(DbError),
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParentNotFound(id) => write!(f, "parent entity not found: {id}"),
            Self::StaleReference(id) => write!(f, "child no longer exists: {id}"),
            Self::DuplicateTargetId(id) => {
                write!(f, "child id appears more than once in target list: {id}")
            }
            Self::DuplicateName { field } => write!(f, "value for `{field}` is already in use"),
            Self::Transaction(err) => write!(f, "reconciliation rolled back: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transaction(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ReconcileError {
    fn from(value: DbError) -> Self {
        Self::Transaction(value)
    }
}

/// Field patch for one child kind.
///
/// Implementations carry the caller-supplied fields for one child; absent
/// fields mean "leave unchanged", never "clear".
pub trait ChildPatch {
    /// Persisted counterpart the patch is compared against.
    type Stored;

    /// Returns whether applying this patch to `stored` would change nothing.
    fn is_noop_on(&self, stored: &Self::Stored) -> bool;
}

/// One entry of the caller-supplied target child list.
///
/// `id` present means "this child should continue to exist with these
/// fields"; absent means "create this child".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetChild<P> {
    /// Persisted child id, when the child already exists.
    pub id: Option<Uuid>,
    /// Caller-supplied fields.
    pub patch: P,
}

/// Disjoint operation sets produced by one diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDiff<P> {
    /// Persisted ids to remove, ascending.
    pub to_delete: Vec<Uuid>,
    /// Persisted ids to patch in place, in target order.
    pub to_update: Vec<(Uuid, P)>,
    /// New children to insert, in target order.
    pub to_add: Vec<P>,
}

impl<P> ChildDiff<P> {
    /// Returns whether the diff contains no operations at all.
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_update.is_empty() && self.to_add.is_empty()
    }
}

/// Operation counts reported back to the caller after a committed apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationSummary {
    /// Children removed.
    pub deleted: usize,
    /// Children patched in place.
    pub updated: usize,
    /// Children inserted.
    pub added: usize,
}

impl ReconciliationSummary {
    /// Returns whether the apply changed nothing.
    pub fn is_noop(&self) -> bool {
        self.deleted == 0 && self.updated == 0 && self.added == 0
    }
}

impl<P> From<&ChildDiff<P>> for ReconciliationSummary {
    fn from(diff: &ChildDiff<P>) -> Self {
        Self {
            deleted: diff.to_delete.len(),
            updated: diff.to_update.len(),
            added: diff.to_add.len(),
        }
    }
}

/// Diffs the target child list against the persisted child map.
///
/// `existing` maps each persisted child id to its stored fields; `target` is
/// the caller's full desired state. An empty target against a non-empty
/// persisted set means "delete all children".
///
/// # Errors
/// - `StaleReference` when a target id is not in `existing`.
/// - `DuplicateTargetId` when one persisted id appears twice in `target`.
pub fn diff_children<P: ChildPatch>(
    existing: &BTreeMap<Uuid, P::Stored>,
    target: Vec<TargetChild<P>>,
) -> ReconcileResult<ChildDiff<P>> {
    let mut retained: HashSet<Uuid> = HashSet::with_capacity(target.len());
    let mut to_update = Vec::new();
    let mut to_add = Vec::new();

    for entry in target {
        match entry.id {
            Some(id) => {
                let stored = existing.get(&id).ok_or(ReconcileError::StaleReference(id))?;
                if !retained.insert(id) {
                    return Err(ReconcileError::DuplicateTargetId(id));
                }
                if !entry.patch.is_noop_on(stored) {
                    to_update.push((id, entry.patch));
                }
            }
            None => to_add.push(entry.patch),
        }
    }

    let to_delete = existing
        .keys()
        .filter(|id| !retained.contains(id))
        .copied()
        .collect();

    Ok(ChildDiff {
        to_delete,
        to_update,
        to_add,
    })
}

static UNIQUE_CONSTRAINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"UNIQUE constraint failed: (.+)").expect("valid unique constraint regex")
});

static CONSTRAINT_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)").expect("valid constraint column regex")
});

/// Converts a SQLite error raised during apply into a reconciliation error.
///
/// Unique-constraint violations become `DuplicateName` with the offending
/// column extracted from the constraint message; for composite indexes the
/// first non-id column is preferred (e.g. `(topic_uuid, name)` maps to
/// `name`). Everything else becomes a generic `Transaction` rollback.
pub fn map_apply_error(err: rusqlite::Error) -> ReconcileError {
    if let rusqlite::Error::SqliteFailure(code, Some(message)) = &err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            if let Some(field) = unique_constraint_field(message) {
                return ReconcileError::DuplicateName { field };
            }
        }
    }
    ReconcileError::Transaction(DbError::Sqlite(err))
}

fn unique_constraint_field(message: &str) -> Option<String> {
    // SQLite emits the prefix once, then a comma-separated `table.column`
    // list for composite indexes.
    let columns = UNIQUE_CONSTRAINT_RE.captures(message)?;

    let mut first = None;
    for caps in CONSTRAINT_COLUMN_RE.captures_iter(&columns[1]) {
        let column = caps[2].to_string();
        if !column.ends_with("_uuid") {
            return Some(column);
        }
        first.get_or_insert(column);
    }
    first
}

#[cfg(test)]
mod tests {
    use super::{
        diff_children, map_apply_error, unique_constraint_field, ChildPatch, ReconcileError,
        ReconciliationSummary, TargetChild,
    };
    use std::collections::BTreeMap;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Patch {
        name: Option<String>,
    }

    impl ChildPatch for Patch {
        type Stored = String;

        fn is_noop_on(&self, stored: &String) -> bool {
            self.name.as_ref().map_or(true, |name| name == stored)
        }
    }

    fn keep(id: Uuid, name: &str) -> TargetChild<Patch> {
        TargetChild {
            id: Some(id),
            patch: Patch {
                name: Some(name.to_string()),
            },
        }
    }

    fn add(name: &str) -> TargetChild<Patch> {
        TargetChild {
            id: None,
            patch: Patch {
                name: Some(name.to_string()),
            },
        }
    }

    #[test]
    fn empty_target_deletes_every_existing_child() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let existing = BTreeMap::from([
            (a, "a".to_string()),
            (b, "b".to_string()),
            (c, "c".to_string()),
        ]);

        let diff = diff_children(&existing, Vec::<TargetChild<Patch>>::new()).unwrap();
        let mut deleted = diff.to_delete.clone();
        deleted.sort();
        let mut expected = vec![a, b, c];
        expected.sort();
        assert_eq!(deleted, expected);
        assert!(diff.to_update.is_empty());
        assert!(diff.to_add.is_empty());
    }

    #[test]
    fn identical_target_produces_empty_diff() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let existing = BTreeMap::from([(a, "arrays".to_string()), (b, "graphs".to_string())]);

        let diff = diff_children(&existing, vec![keep(a, "arrays"), keep(b, "graphs")]).unwrap();
        assert!(diff.is_empty());
        assert!(ReconciliationSummary::from(&diff).is_noop());
    }

    #[test]
    fn absent_patch_fields_do_not_count_as_changes() {
        let a = Uuid::new_v4();
        let existing = BTreeMap::from([(a, "arrays".to_string())]);

        let target = vec![TargetChild {
            id: Some(a),
            patch: Patch { name: None },
        }];
        let diff = diff_children(&existing, target).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn changed_fields_are_emitted_as_updates_only() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let existing = BTreeMap::from([(a, "arrays".to_string()), (b, "graphs".to_string())]);

        let diff = diff_children(&existing, vec![keep(a, "arrays"), keep(b, "trees")]).unwrap();
        assert!(diff.to_delete.is_empty());
        assert!(diff.to_add.is_empty());
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].0, b);
    }

    #[test]
    fn partition_covers_delete_update_add_together() {
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let existing = BTreeMap::from([
            (s1, "Arrays".to_string()),
            (s2, "Linked Lists".to_string()),
        ]);

        let diff = diff_children(&existing, vec![keep(s1, "Arrays"), add("Trees")]).unwrap();
        assert_eq!(diff.to_delete, vec![s2]);
        assert!(diff.to_update.is_empty());
        assert_eq!(diff.to_add.len(), 1);
        assert_eq!(diff.to_add[0].name.as_deref(), Some("Trees"));
    }

    #[test]
    fn stale_reference_fails_the_whole_diff() {
        let a = Uuid::new_v4();
        let stale = Uuid::new_v4();
        let existing = BTreeMap::from([(a, "arrays".to_string())]);

        let err = diff_children(&existing, vec![keep(a, "arrays"), keep(stale, "ghost")])
            .unwrap_err();
        assert!(matches!(err, ReconcileError::StaleReference(id) if id == stale));
    }

    #[test]
    fn duplicate_target_id_is_rejected() {
        let a = Uuid::new_v4();
        let existing = BTreeMap::from([(a, "arrays".to_string())]);

        let err =
            diff_children(&existing, vec![keep(a, "arrays"), keep(a, "again")]).unwrap_err();
        assert!(matches!(err, ReconcileError::DuplicateTargetId(id) if id == a));
    }

    #[test]
    fn unique_constraint_field_prefers_non_id_column() {
        assert_eq!(
            unique_constraint_field("UNIQUE constraint failed: topics.name").as_deref(),
            Some("name")
        );
        assert_eq!(
            unique_constraint_field(
                "UNIQUE constraint failed: subtopics.topic_uuid, subtopics.name"
            )
            .as_deref(),
            Some("name")
        );
        assert_eq!(
            unique_constraint_field(
                "UNIQUE constraint failed: team_members.team_uuid, team_members.user_uuid"
            )
            .as_deref(),
            Some("team_uuid")
        );
        assert_eq!(unique_constraint_field("database is locked"), None);
    }

    #[test]
    fn non_constraint_errors_map_to_transaction_rollback() {
        let err = map_apply_error(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, ReconcileError::Transaction(_)));
    }
}
