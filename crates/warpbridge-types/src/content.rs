//! Helpers for building packet content.
//!
//! The relay treats content as an opaque string. Engines that emit packets
//! use [`compose`] to produce the `{"command": ..., ...params}` object every
//! node expects.

use crate::error::{RelayError, RelayResult};
use serde_json::{Map, Value};

/// Key that carries the command name inside packet content.
pub const COMMAND_KEY: &str = "command";

/// Insert `command` into `params` and serialize the object.
///
/// Fails if `params` already carries a `command` key.
pub fn compose(command: &str, mut params: Map<String, Value>) -> RelayResult<String> {
    if params.contains_key(COMMAND_KEY) {
        return Err(RelayError::InvalidContent(format!(
            "params for '{command}' already contain a '{COMMAND_KEY}' key"
        )));
    }
    params.insert(COMMAND_KEY.to_string(), Value::String(command.to_string()));
    Ok(Value::Object(params).to_string())
}

/// Read the command name from content, if it is a JSON object carrying one.
pub fn command_name(content: &str) -> Option<String> {
    let value: Value = serde_json::from_str(content).ok()?;
    value.get(COMMAND_KEY)?.as_str().map(String::from)
}
