// Infrastructure layer module
// Contains the message broker adapter and connection handling

pub mod broker;
