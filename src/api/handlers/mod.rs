pub mod agents;
pub mod health;
pub mod sightings;
pub mod state;
pub mod stream;
pub mod teams;
