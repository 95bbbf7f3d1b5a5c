// Names shared by every component wired to the bus

use super::broker::QueueOptions;

/// Topic exchange sightings are published to
pub const SIGHTING_EXCHANGE: &str = "pokemon_exchange";

/// Durable queue the dispatcher consumes sightings from
pub const SIGHTING_QUEUE: &str = "sightings_q";

/// Durable work queue shared by all agents
pub const TASK_QUEUE: &str = "pokemon_tasks";

/// Terminal destination of expired or rejected capture tasks
pub const DEAD_LETTER_QUEUE: &str = "dead_letter_tasks";

/// The default exchange, routing by queue name
pub const DEFAULT_EXCHANGE: &str = "";

/// Options of the work queue
///
/// The dispatcher and every agent declare the queue with these exact
/// options, so the declarations stay idempotent.
pub fn task_queue_options(delivery_limit: Option<u32>) -> QueueOptions {
    QueueOptions::durable()
        .with_dead_letter(DEFAULT_EXCHANGE, DEAD_LETTER_QUEUE)
        .with_delivery_limit(delivery_limit)
}
