//! Decoding of raw messages arriving from outside the process.

use domain::{Command, CommandKind, Event, EventKind, Message};
use serde_json::Value;

use crate::error::{Result, ServiceError};

/// Decodes a JSON message carrying a `"type"` tag.
///
/// # Errors
///
/// Returns `UnroutableMessage` when the tag is missing or names no known
/// command or event, and `Serialization` when the fields do not match the
/// tagged type.
pub fn decode_message(payload: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(payload)?;
    decode_value(value)
}

/// Same as [`decode_message`], for an already parsed value.
pub fn decode_value(value: Value) -> Result<Message> {
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::UnroutableMessage("message has no type tag".into()))?;

    if CommandKind::from_name(tag).is_some() {
        let command: Command = serde_json::from_value(value)?;
        Ok(command.into())
    } else if EventKind::from_name(tag).is_some() {
        let event: Event = serde_json::from_value(value)?;
        Ok(event.into())
    } else {
        Err(ServiceError::UnroutableMessage(tag.to_string()))
    }
}
