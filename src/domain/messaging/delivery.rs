use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::BrokerResult;

/// How a delivery is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Ack,
    Nack { requeue: bool },
}

/// Why a message ended up on a dead-letter queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// Its time-to-live elapsed while it waited in a queue
    Expired,
    /// It was negatively acknowledged without requeue
    Rejected,
    /// It was requeued more often than the queue's delivery limit allows
    DeliveryLimit,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadLetterReason::Expired => write!(f, "expired"),
            DeadLetterReason::Rejected => write!(f, "rejected"),
            DeadLetterReason::DeliveryLimit => write!(f, "delivery_limit"),
        }
    }
}

/// Dead-letter history attached to a redirected message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Death {
    pub reason: DeadLetterReason,
    /// Queue the message was dead-lettered from
    pub queue: String,
    /// Times the message had been delivered before it died
    pub deliveries: u32,
}

/// Settles deliveries on behalf of a broker
pub trait Acknowledger: Send + Sync {
    fn settle(&self, delivery_tag: u64, settlement: Settlement) -> BrokerResult<()>;
}

/// A message handed to a consumer
///
/// Manual-ack deliveries must be settled with [`Delivery::ack`],
/// [`Delivery::nack`] or [`Delivery::reject`]. A delivery dropped unsettled
/// is returned to its queue, as when a channel closes.
pub struct Delivery {
    pub delivery_tag: u64,
    pub exchange: String,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
    pub death: Option<Death>,
    acker: Option<Arc<dyn Acknowledger>>,
}

impl Delivery {
    /// Builds a delivery; `acker` is `None` for broker-settled deliveries
    pub fn new(
        delivery_tag: u64,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: Vec<u8>,
        redelivered: bool,
        death: Option<Death>,
        acker: Option<Arc<dyn Acknowledger>>,
    ) -> Self {
        Self {
            delivery_tag,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            body,
            redelivered,
            death,
            acker,
        }
    }

    /// Deserializes the JSON body
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    /// Remove the message from its queue for good
    pub fn ack(mut self) -> BrokerResult<()> {
        self.settle(Settlement::Ack)
    }

    /// Negatively acknowledge; `requeue = false` dead-letters the message
    pub fn nack(mut self, requeue: bool) -> BrokerResult<()> {
        self.settle(Settlement::Nack { requeue })
    }

    /// Permanently reject the message
    pub fn reject(self) -> BrokerResult<()> {
        self.nack(false)
    }

    fn settle(&mut self, settlement: Settlement) -> BrokerResult<()> {
        match self.acker.take() {
            Some(acker) => acker.settle(self.delivery_tag, settlement),
            None => Ok(()),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            if let Err(e) = acker.settle(self.delivery_tag, Settlement::Nack { requeue: true }) {
                tracing::debug!(delivery_tag = self.delivery_tag, error = %e, "requeue of dropped delivery failed");
            }
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .field("death", &self.death)
            .field("settled", &self.acker.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(u64, Settlement)>>);

    impl Acknowledger for Recorder {
        fn settle(&self, delivery_tag: u64, settlement: Settlement) -> BrokerResult<()> {
            self.0.lock().unwrap().push((delivery_tag, settlement));
            Ok(())
        }
    }

    fn delivery(tag: u64, recorder: &Arc<Recorder>) -> Delivery {
        let acker: Arc<dyn Acknowledger> = recorder.clone();
        Delivery::new(tag, "", "q", b"{}".to_vec(), false, None, Some(acker))
    }

    #[test]
    fn ack_settles_once() {
        let recorder = Arc::new(Recorder::default());
        delivery(1, &recorder).ack().unwrap();

        assert_eq!(*recorder.0.lock().unwrap(), vec![(1, Settlement::Ack)]);
    }

    #[test]
    fn reject_is_nack_without_requeue() {
        let recorder = Arc::new(Recorder::default());
        delivery(2, &recorder).reject().unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(2, Settlement::Nack { requeue: false })]
        );
    }

    #[test]
    fn dropped_delivery_is_requeued() {
        let recorder = Arc::new(Recorder::default());
        drop(delivery(3, &recorder));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![(3, Settlement::Nack { requeue: true })]
        );
    }

    #[test]
    fn auto_ack_delivery_settles_to_nothing() {
        let delivery = Delivery::new(4, "", "q", vec![], false, None, None);
        assert!(delivery.ack().is_ok());
    }

    #[test]
    fn reason_display() {
        assert_eq!(DeadLetterReason::Expired.to_string(), "expired");
        assert_eq!(DeadLetterReason::Rejected.to_string(), "rejected");
        assert_eq!(DeadLetterReason::DeliveryLimit.to_string(), "delivery_limit");
    }
}
