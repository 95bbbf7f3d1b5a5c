// Message bus port
// Everything the coordination layer needs from a broker: topic exchanges,
// durable queues with dead-letter redirection, per-message TTL, prefetch
// limited consumers and explicit settlement.

pub mod broker;
pub mod delivery;
pub mod errors;
pub mod topology;

pub use broker::{
    ConsumeOptions, Consumer, ExchangeKind, MessageBroker, OutboundMessage, QueueOptions,
    QueueStats,
};
pub use delivery::{Acknowledger, DeadLetterReason, Death, Delivery, Settlement};
pub use errors::{BrokerError, BrokerResult};
