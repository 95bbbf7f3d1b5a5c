// Domain layer module exports
// Sightings, capture tasks and teams are plain values; the message bus is a
// port (trait) implemented by adapters in `infrastructure`.

pub mod messaging;
pub mod sighting;
pub mod task;
pub mod team;
