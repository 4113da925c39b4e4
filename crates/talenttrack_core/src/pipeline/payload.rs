//! Raw mutation payload parsing helpers.
//!
//! # Responsibility
//! - Turn untyped JSON payloads into typed request models.
//! - Accumulate one error per invalid field instead of stopping at the first.
//!
//! # Invariants
//! - Helpers never panic on malformed input; every failure becomes a
//!   `FieldError` naming the originating field.
//! - Absent optional fields parse to `None` without an error; `null` counts
//!   as absent.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// One field-level validation failure, attachable to a form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Dotted/indexed path of the failing field, e.g. `subtopics[2].name`.
    pub field: String,
    /// Human-readable message.
    pub message: String,
}

impl FieldError {
    /// Builds one field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Typed payload contract for the schema-validation stage.
pub trait MutationPayload: Sized {
    /// Parses the raw payload, reporting every invalid field.
    fn parse(raw: &Value) -> Result<Self, Vec<FieldError>>;
}

/// Requires the payload root to be a JSON object.
pub fn as_object<'a>(raw: &'a Value, errors: &mut Vec<FieldError>) -> Option<&'a Map<String, Value>> {
    match raw.as_object() {
        Some(map) => Some(map),
        None => {
            errors.push(FieldError::new("payload", "payload must be an object"));
            None
        }
    }
}

/// Requires a non-empty string field, trimmed, capped at `max_len` chars.
pub fn require_string(
    obj: &Map<String, Value>,
    field: &str,
    max_len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
        Some(value) => string_value(value, field, max_len, true, errors),
    }
}

/// Reads an optional string field; absent and `null` both parse to `None`.
pub fn optional_string(
    obj: &Map<String, Value>,
    field: &str,
    max_len: usize,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => string_value(value, field, max_len, false, errors),
    }
}

/// Reads an optional UUID string field.
pub fn optional_uuid(
    obj: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Uuid> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => match Uuid::parse_str(text.trim()) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.push(FieldError::new(field, "must be a valid id"));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(field, "must be a valid id"));
            None
        }
    }
}

/// Requires a UUID string field.
pub fn require_uuid(
    obj: &Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<Uuid> {
    match obj.get(field) {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
        Some(_) => optional_uuid(obj, field, errors),
    }
}

/// Reads an optional array field; absent and `null` both parse to `None`.
pub fn optional_array<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a Vec<Value>> {
    match obj.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items),
        Some(_) => {
            errors.push(FieldError::new(field, "must be a list"));
            None
        }
    }
}

fn string_value(
    value: &Value,
    field: &str,
    max_len: usize,
    required_non_empty: bool,
    errors: &mut Vec<FieldError>,
) -> Option<String> {
    let Some(text) = value.as_str() else {
        errors.push(FieldError::new(field, "must be a string"));
        return None;
    };

    let trimmed = text.trim();
    if required_non_empty && trimmed.is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
        return None;
    }
    if trimmed.chars().count() > max_len {
        errors.push(FieldError::new(
            field,
            format!("must be at most {max_len} characters"),
        ));
        return None;
    }

    Some(trimmed.to_string())
}
