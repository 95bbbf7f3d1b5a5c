use serde::{Deserialize, Serialize};

/// Prefix of every routing key a sighting is published under
pub const SIGHTING_TOPIC_PREFIX: &str = "pokemon.sighting";

/// Returns the routing key a sighting of `category` is published under
///
/// # Example
/// ```
/// use pokemon_tracker_api::domain::sighting::sighting_topic;
///
/// assert_eq!(sighting_topic("electric"), "pokemon.sighting.electric");
/// ```
pub fn sighting_topic(category: &str) -> String {
    format!("{}.{}", SIGHTING_TOPIC_PREFIX, category)
}

/// An observed pokemon, as reported by a producer
///
/// The `category` field is also accepted under its legacy name `element`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sighting {
    pub pokemon: String,
    pub location: String,
    #[serde(alias = "element")]
    pub category: String,
}

impl Sighting {
    pub fn new(
        pokemon: impl Into<String>,
        location: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            pokemon: pokemon.into(),
            location: location.into(),
            category: category.into(),
        }
    }

    /// Checks the fields a sighting needs before it can be routed
    ///
    /// # Business Rules
    /// - Pokemon and location must not be blank
    /// - Category must be a single topic word (no `.`, `*` or `#`)
    pub fn validate(&self) -> Result<(), String> {
        if self.pokemon.trim().is_empty() {
            return Err("Pokemon cannot be empty".to_string());
        }
        if self.location.trim().is_empty() {
            return Err("Location cannot be empty".to_string());
        }
        validate_category(&self.category)
    }

    /// Routing key this sighting is published under
    pub fn topic(&self) -> String {
        sighting_topic(&self.category)
    }
}

/// Checks that a category can be used as one word of a routing key
pub fn validate_category(category: &str) -> Result<(), String> {
    if category.trim().is_empty() {
        return Err("Category cannot be empty".to_string());
    }
    if category.contains(['.', '*', '#']) {
        return Err(format!("Invalid category: {}", category));
    }
    Ok(())
}

/// Payload carried on the sighting topics
///
/// `capture_time` is the number of seconds the resulting capture task may
/// wait in the work queue; the dispatcher picks one when it is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SightingMessage {
    #[serde(flatten)]
    pub sighting: Sighting,
    #[serde(
        rename = "captureTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub capture_time: Option<u32>,
}

impl SightingMessage {
    pub fn new(sighting: Sighting, capture_time: Option<u32>) -> Self {
        Self {
            sighting,
            capture_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_uses_category() {
        let sighting = Sighting::new("Pikachu", "Park", "electric");
        assert_eq!(sighting.topic(), "pokemon.sighting.electric");
    }

    #[test]
    fn accepts_legacy_element_key() {
        let sighting: Sighting = serde_json::from_str(
            r#"{"pokemon":"Charmander","location":"Volcano","element":"fire"}"#,
        )
        .unwrap();

        assert_eq!(sighting.category, "fire");
    }

    #[test]
    fn serializes_category_key() {
        let json = serde_json::to_value(Sighting::new("Squirtle", "Lake", "water")).unwrap();

        assert_eq!(json["category"], "water");
        assert!(json.get("element").is_none());
    }

    #[test]
    fn message_round_trip_keeps_capture_time() {
        let message = SightingMessage::new(Sighting::new("Pikachu", "Park", "electric"), Some(7));
        let bytes = serde_json::to_vec(&message).unwrap();
        let decoded: SightingMessage = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded, message);
    }

    #[test]
    fn message_without_capture_time() {
        let decoded: SightingMessage = serde_json::from_str(
            r#"{"pokemon":"Pikachu","location":"Park","category":"electric"}"#,
        )
        .unwrap();

        assert_eq!(decoded.capture_time, None);
    }

    #[test]
    fn validate_rejects_blank_fields() {
        assert!(Sighting::new("", "Park", "electric").validate().is_err());
        assert!(Sighting::new("Pikachu", " ", "electric").validate().is_err());
        assert!(Sighting::new("Pikachu", "Park", "").validate().is_err());
    }

    #[test]
    fn validate_rejects_wildcard_category() {
        let result = Sighting::new("Pikachu", "Park", "electric.#").validate();

        assert!(result.unwrap_err().contains("Invalid category"));
    }
}
