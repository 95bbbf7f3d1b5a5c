// Message broker adapters
// Implementations of the `MessageBroker` port

pub mod amqp_broker;
pub mod connect;
pub mod in_memory_broker;
pub mod topic;

pub use amqp_broker::AmqpBroker;
pub use connect::{connect_broker, connect_with_retry, RetryPolicy};
pub use in_memory_broker::InMemoryBroker;
