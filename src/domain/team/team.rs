use serde::{Deserialize, Serialize};

use crate::domain::sighting::{sighting_topic, validate_category};

/// Interest group watching a subset of sighting categories
///
/// # Invariants
/// - Name cannot be empty
/// - At least one category, each usable as a topic word
/// - `topics` holds one derived routing key per category, in order
///
/// # Example
/// ```
/// use pokemon_tracker_api::domain::team::Team;
///
/// let team = Team::new("Aqua", vec!["water".to_string(), "ice".to_string()])
///     .expect("valid team");
///
/// assert_eq!(team.topics(), ["pokemon.sighting.water", "pokemon.sighting.ice"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    name: String,
    #[serde(rename = "elements")]
    categories: Vec<String>,
    topics: Vec<String>,
}

impl Team {
    /// Creates a team and derives its topics
    ///
    /// Duplicate categories are kept once, first occurrence wins.
    pub fn new(name: impl Into<String>, categories: Vec<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Team name cannot be empty".to_string());
        }
        if categories.is_empty() {
            return Err("Team needs at least one category".to_string());
        }

        let mut unique: Vec<String> = Vec::with_capacity(categories.len());
        for category in categories {
            validate_category(&category)?;
            if !unique.contains(&category) {
                unique.push(category);
            }
        }

        let topics = unique.iter().map(|c| sighting_topic(c)).collect();

        Ok(Self {
            name,
            categories: unique,
            topics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }
}
