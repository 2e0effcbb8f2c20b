//! Cluster Wire Protocol
//!
//! Defines the messages exchanged between worker processes and the primary,
//! and the error payloads rendered to HTTP clients.
//!
//! Frames are JSON objects, one per line, over the child process's stdio.
//! Each operation carries a correlation id that its reply echoes back
//! unchanged; a worker channel multiplexes any number of in-flight requests
//! purely by that id.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::store::types::StoreError;

// --- Response texts ---

pub mod messages {
    pub const NOT_FOUND: &str = "Not found";
    pub const RECORD_NOT_FOUND: &str = "Record not found";
    pub const NOT_ALLOWED: &str = "Method not allowed";
    pub const BODY_INVALID: &str = "Body does not contain required fields";
    pub const JSON_INVALID: &str = "Request body is not valid JSON";
    pub const UUID_INVALID: &str = "Record id is invalid (not a uuid)";
    pub const ARGS_INVALID: &str = "Operation arguments are invalid";
    pub const UNKNOWN_ACTION: &str = "Unknown action";
    pub const STORE_UNAVAILABLE: &str = "Record store is unavailable";
    pub const INTERNAL: &str = "Internal error";
}

/// The closed set of store actions.
///
/// Parsing is the only way in: an action name outside this set is rejected
/// at the dispatch boundary instead of silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    All,
    Get,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::All => "allRecords",
            Action::Get => "getRecord",
            Action::Create => "createRecord",
            Action::Update => "updateRecord",
            Action::Delete => "deleteRecord",
        }
    }
}

impl FromStr for Action {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allRecords" => Ok(Action::All),
            "getRecord" => Ok(Action::Get),
            "createRecord" => Ok(Action::Create),
            "updateRecord" => Ok(Action::Update),
            "deleteRecord" => Ok(Action::Delete),
            other => Err(StoreError::UnknownAction(other.to_string())),
        }
    }
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Mints a correlation id unique within this process: pid plus a process-wide
/// counter. Correlation is scoped per worker channel, so per-process
/// uniqueness is all the pairing needs.
pub fn next_correlation_id() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// A shaped, validated request destined for the store.
///
/// Created by the HTTP layer, consumed once by the dispatcher, then
/// discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Correlation id, echoed back unchanged on the reply.
    pub id: String,
    /// Action name, parsed against [`Action`] by the dispatcher.
    pub action: String,
    /// Positional arguments: record id and/or payload, in that order.
    #[serde(default)]
    pub data: Vec<Value>,
    /// Success status hint for the route (201 for create, 204 for delete).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<u16>,
}

impl Operation {
    fn new(action: Action, data: Vec<Value>, code: Option<u16>) -> Self {
        Self {
            id: next_correlation_id(),
            action: action.as_str().to_string(),
            data,
            code,
        }
    }

    pub fn all() -> Self {
        Self::new(Action::All, Vec::new(), None)
    }

    pub fn get(id: Uuid) -> Self {
        Self::new(Action::Get, vec![Value::String(id.to_string())], None)
    }

    pub fn create(fields: Value) -> Self {
        Self::new(Action::Create, vec![fields], Some(201))
    }

    pub fn update(id: Uuid, fields: Value) -> Self {
        Self::new(
            Action::Update,
            vec![Value::String(id.to_string()), fields],
            None,
        )
    }

    pub fn delete(id: Uuid) -> Self {
        Self::new(Action::Delete, vec![Value::String(id.to_string())], Some(204))
    }
}

/// The store's answer to exactly one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ResponseError>,
}

impl Reply {
    pub fn success(op: &Operation, data: Option<Value>) -> Self {
        Self {
            id: op.id.clone(),
            code: op.code.unwrap_or(200),
            data,
            error: None,
        }
    }

    pub fn failure(op: &Operation, error: ResponseError) -> Self {
        Self {
            id: op.id.clone(),
            code: error.status_code,
            data: None,
            error: Some(error),
        }
    }
}

/// Frames a worker writes upstream to the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The HTTP listener is bound; the worker can take traffic.
    Ready { index: usize },
    /// One shaped record operation to run against the store.
    Op { op: Operation },
}

/// Error payload rendered to HTTP clients and carried inside replies.
///
/// Domain failures cross the process boundary only in this form, never as
/// native errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    pub name: String,
    pub message: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<Value>,
}

impl ResponseError {
    pub fn new(name: &str, message: &str, status_code: u16) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            status_code,
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn route_not_found() -> Self {
        Self::new("NotFoundError", messages::NOT_FOUND, 404)
    }

    pub fn record_not_found() -> Self {
        Self::new("NotFoundError", messages::RECORD_NOT_FOUND, 404)
    }

    pub fn invalid_id() -> Self {
        Self::new("ShapingError", messages::UUID_INVALID, 400)
    }

    pub fn invalid_body(issues: Vec<String>) -> Self {
        Self::new("ShapingError", messages::BODY_INVALID, 400).with_body(json!({ "issues": issues }))
    }

    pub fn malformed_json(reason: &str) -> Self {
        Self::new("ShapingError", messages::JSON_INVALID, 400).with_body(json!({ "reason": reason }))
    }

    pub fn invalid_arguments(reason: &str) -> Self {
        Self::new("ShapingError", messages::ARGS_INVALID, 400).with_body(json!({ "reason": reason }))
    }

    pub fn method_not_allowed() -> Self {
        Self::new("MethodNotAllowedError", messages::NOT_ALLOWED, 405)
    }

    pub fn unknown_action(action: &str) -> Self {
        Self::new("UnknownActionError", messages::UNKNOWN_ACTION, 500)
            .with_body(json!({ "action": action }))
    }

    pub fn store_unavailable() -> Self {
        Self::new("InternalError", messages::STORE_UNAVAILABLE, 500)
    }

    pub fn internal(reason: &str) -> Self {
        Self::new("InternalError", messages::INTERNAL, 500).with_body(json!({ "reason": reason }))
    }
}

impl From<&StoreError> for ResponseError {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::record_not_found(),
            StoreError::UnknownAction(action) => Self::unknown_action(action),
        }
    }
}

/// Transport failures on the worker/primary channel. Domain errors never
/// take this path; they travel inside a reply.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("ipc channel closed")]
    ChannelClosed,
}
