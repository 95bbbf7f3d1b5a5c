use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::delivery::Delivery;
use super::errors::BrokerResult;

/// Routing behaviour of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Routing key must equal the binding key
    Direct,
    /// Binding keys are dot-separated patterns with `*` and `#` wildcards
    Topic,
    /// Every bound queue receives every message
    Fanout,
}

/// Arguments a queue is declared with
///
/// Re-declaring an existing queue succeeds only with identical options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    /// Exchange dead-lettered messages are republished to (`""` is the default exchange)
    pub dead_letter_exchange: Option<String>,
    /// Routing key used when dead-lettering; the original key when absent
    pub dead_letter_routing_key: Option<String>,
    /// Deliveries after which a requeued message is dead-lettered instead
    pub delivery_limit: Option<u32>,
}

impl QueueOptions {
    /// Durable queue that survives its consumers
    pub fn durable() -> Self {
        Self {
            durable: true,
            ..Self::default()
        }
    }

    /// Private, non-durable queue deleted with its last consumer
    pub fn transient() -> Self {
        Self {
            durable: false,
            exclusive: true,
            auto_delete: true,
            ..Self::default()
        }
    }

    pub fn with_dead_letter(
        mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self.dead_letter_routing_key = Some(routing_key.into());
        self
    }

    pub fn with_delivery_limit(mut self, limit: Option<u32>) -> Self {
        self.delivery_limit = limit;
        self
    }

    /// True when rejected or expired messages have somewhere to go
    pub fn dead_letters(&self) -> bool {
        self.dead_letter_exchange.is_some() || self.dead_letter_routing_key.is_some()
    }
}

/// How a consumer subscribes to a queue
#[derive(Debug, Clone, Default)]
pub struct ConsumeOptions {
    /// Consumer tag; generated by the broker when absent
    pub tag: Option<String>,
    /// Maximum unsettled deliveries (`0` = unlimited)
    pub prefetch: u16,
    /// Deliveries are settled by the broker as soon as they are handed out
    pub auto_ack: bool,
}

impl ConsumeOptions {
    /// Manual acknowledgement with `prefetch` in-flight deliveries
    pub fn manual(tag: impl Into<String>, prefetch: u16) -> Self {
        Self {
            tag: Some(tag.into()),
            prefetch,
            auto_ack: false,
        }
    }

    /// Broker-settled, unlimited deliveries
    pub fn auto_ack() -> Self {
        Self {
            tag: None,
            prefetch: 0,
            auto_ack: true,
        }
    }
}

/// A message on its way to an exchange
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub persistent: bool,
    /// Time the message may wait in a queue before it expires
    pub expiration: Option<Duration>,
}

impl OutboundMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Serializes `value` as a JSON body
    pub fn json<T: Serialize>(value: &T) -> BrokerResult<Self> {
        Ok(Self {
            body: serde_json::to_vec(value)?,
            content_type: Some("application/json".to_string()),
            ..Self::default()
        })
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

/// Snapshot of a queue's depth and subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub name: String,
    pub messages: usize,
    pub consumers: usize,
}

/// Message broker contract consumed by the coordination layer
///
/// Declarations are idempotent. Publishing to an exchange with no matching
/// binding silently drops the message.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declare an exchange
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> BrokerResult<()>;

    /// Declare a queue, returning its name (generated when `name` is empty)
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> BrokerResult<String>;

    /// Bind a queue to an exchange under a binding key
    async fn bind_queue(&self, queue: &str, exchange: &str, binding_key: &str)
        -> BrokerResult<()>;

    /// Publish a message (`""` is the default exchange, routing by queue name)
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> BrokerResult<()>;

    /// Start consuming from a queue
    async fn consume(&self, queue: &str, options: ConsumeOptions)
        -> BrokerResult<Box<dyn Consumer>>;

    /// Cancel a consumer; its `next` returns `None` from then on
    async fn cancel(&self, consumer_tag: &str) -> BrokerResult<()>;

    /// Inspect a queue without declaring it
    async fn queue_stats(&self, queue: &str) -> BrokerResult<QueueStats>;
}

/// A subscription handle
///
/// Dropping the consumer releases the subscription.
#[async_trait]
pub trait Consumer: Send {
    fn tag(&self) -> &str;

    /// Wait for the next delivery; `None` once the subscription is closed
    ///
    /// Cancel-safe: dropping the future never loses a delivery.
    async fn next(&mut self) -> Option<Delivery>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_queue_is_private() {
        let options = QueueOptions::transient();

        assert!(!options.durable);
        assert!(options.exclusive);
        assert!(options.auto_delete);
        assert!(!options.dead_letters());
    }

    #[test]
    fn dead_letter_options() {
        let options = QueueOptions::durable().with_dead_letter("", "dead_letter_tasks");

        assert!(options.durable);
        assert!(options.dead_letters());
        assert_eq!(options.dead_letter_exchange.as_deref(), Some(""));
    }

    #[test]
    fn json_message_sets_content_type() {
        let message = OutboundMessage::json(&serde_json::json!({"a": 1}))
            .unwrap()
            .persistent()
            .with_expiration(Duration::from_secs(5));

        assert_eq!(message.content_type.as_deref(), Some("application/json"));
        assert!(message.persistent);
        assert_eq!(message.expiration, Some(Duration::from_secs(5)));
    }
}
