use async_trait::async_trait;
use serde_json::{Map, Value};

/// Extra fields merged into a broadcast envelope
pub type Fields = Map<String, Value>;

/// Converts a JSON object into [`Fields`]; anything else yields no fields
///
/// # Example
/// ```
/// use pokemon_tracker_api::hub::fields;
/// use serde_json::json;
///
/// let extra = fields(json!({"id": 1, "name": "Jessie"}));
/// assert_eq!(extra.len(), 2);
/// assert!(fields(json!(null)).is_empty());
/// ```
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

/// Capability to publish a human-readable event to every live viewer
///
/// Producers depend on this trait rather than on the hub itself. Delivery is
/// best-effort and never fails the caller; rejected events are logged.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publish `message` as an event of type `category`
    ///
    /// `extra` must not contain the reserved keys `type` or `message`.
    async fn broadcast(&self, message: &str, category: &str, include_time: bool, extra: Fields);
}
