//! Pokemon Tracker API Library
//!
//! This library provides the coordination layer of the pokemon tracker:
//! sightings routed over a message bus, headquarters dispatching capture
//! tasks, rocket agents working them off, and a hub relaying every step to
//! live viewers.

pub mod agents;
pub mod api;
pub mod app;
pub mod config;
pub mod domain;
pub mod hub;
pub mod infrastructure;
pub mod pipeline;
