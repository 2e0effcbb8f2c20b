use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Domain payload of a record.
///
/// The cluster layer carries this as an opaque JSON object; only the HTTP
/// layer looks inside. Unknown properties are rejected on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordFields {
    pub username: String,
    pub age: u32,
    pub hobbies: Vec<String>,
}

/// A stored record. Serializes flat, id first:
/// `{"id": "...", "username": "...", "age": n, "hobbies": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: RecordFields,
}

/// Domain failures of the record table. These travel across the process
/// boundary as reply data, never as panics or native errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The id is not (or no longer) present.
    #[error("record not found")]
    NotFound,
    /// The requested action is outside the supported set. This signals a
    /// protocol mismatch between worker and primary, not a client mistake.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}
