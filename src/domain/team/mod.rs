// Team domain module
// A team is a read-only interest group over a subset of sighting categories

#![allow(clippy::module_inception)]

pub mod team;

// Re-export main types for convenience
pub use team::Team;
