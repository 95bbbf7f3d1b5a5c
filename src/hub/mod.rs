// Live viewer fan-out
//
// The hub is a single coordinator task that owns the set of viewer
// mailboxes. Everything else reaches it through `HubHandle`, which also
// implements the `Broadcaster` capability the rest of the crate depends on.

#![allow(clippy::module_inception)]

pub mod broadcaster;
pub mod envelope;
pub mod errors;
pub mod hub;
pub mod viewer;

#[cfg(test)]
pub(crate) mod recording;

pub use broadcaster::{fields, Broadcaster, Fields};
pub use errors::HubError;
pub use hub::{Hub, HubHandle, Viewer, ViewerId};
pub use viewer::{run_viewer, ViewerSettings};
