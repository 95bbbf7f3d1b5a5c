use chrono::{DateTime, Local};
use serde_json::Value;

use super::broadcaster::Fields;
use super::errors::HubError;

/// Keys owned by the envelope itself
pub const RESERVED_KEYS: [&str; 2] = ["type", "message"];

/// Timestamp layout of the `time` field
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Builds the `{type, message, time?, ...extra}` event object
///
/// # Errors
/// `HubError::ReservedKey` if `extra` carries `type` or `message`.
pub fn build_envelope(
    message: &str,
    category: &str,
    time: Option<DateTime<Local>>,
    extra: Fields,
) -> Result<Fields, HubError> {
    if let Some(key) = RESERVED_KEYS.iter().find(|key| extra.contains_key(**key)) {
        return Err(HubError::ReservedKey(key.to_string()));
    }

    let mut envelope = Fields::new();
    envelope.insert("type".to_string(), Value::from(category));
    envelope.insert("message".to_string(), Value::from(message));
    if let Some(time) = time {
        envelope.insert(
            "time".to_string(),
            Value::from(time.format(TIME_FORMAT).to_string()),
        );
    }
    envelope.extend(extra);
    Ok(envelope)
}

/// Serializes an envelope into the text frame sent to viewers
pub fn encode(envelope: &Fields) -> Result<String, HubError> {
    Ok(serde_json::to_string(envelope)?)
}
