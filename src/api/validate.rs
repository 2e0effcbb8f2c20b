//! Request Shaping Checks
//!
//! Everything here resolves on the worker; a request that fails validation
//! never crosses the process boundary.

use serde_json::Value;
use uuid::Uuid;

use crate::cluster::protocol::ResponseError;

/// A path id must be a well-formed uuid before it is allowed anywhere near
/// the store.
pub fn parse_record_id(raw: &str) -> Result<Uuid, ResponseError> {
    raw.parse::<Uuid>().map_err(|_| ResponseError::invalid_id())
}

/// Parses and validates a record payload. The returned value is the exact
/// JSON that will travel to the store.
pub fn parse_body(raw: &str) -> Result<Value, ResponseError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| ResponseError::malformed_json(&err.to_string()))?;
    check_fields(&value)?;
    Ok(value)
}

fn check_fields(value: &Value) -> Result<(), ResponseError> {
    let Some(object) = value.as_object() else {
        return Err(ResponseError::invalid_body(vec![
            "payload must be a JSON object".to_string(),
        ]));
    };

    let mut issues = Vec::new();

    match object.get("username") {
        Some(Value::String(_)) => {}
        Some(_) => issues.push("username must be a string".to_string()),
        None => issues.push("username is missing".to_string()),
    }

    match object.get("age") {
        Some(age) if age.as_u64().is_some_and(|n| n <= u64::from(u32::MAX)) => {}
        Some(_) => issues.push("age must be a non-negative integer".to_string()),
        None => issues.push("age is missing".to_string()),
    }

    match object.get("hobbies") {
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => {}
        Some(_) => issues.push("hobbies must be an array of strings".to_string()),
        None => issues.push("hobbies is missing".to_string()),
    }

    for key in object.keys() {
        if !matches!(key.as_str(), "username" | "age" | "hobbies") {
            issues.push(format!("unexpected property: {key}"));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ResponseError::invalid_body(issues))
    }
}
