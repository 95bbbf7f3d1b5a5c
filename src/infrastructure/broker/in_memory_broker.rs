use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::topic::topic_matches;
use crate::domain::messaging::{
    Acknowledger, BrokerError, BrokerResult, ConsumeOptions, Consumer, DeadLetterReason, Death,
    Delivery, ExchangeKind, MessageBroker, OutboundMessage, QueueOptions, QueueStats, Settlement,
};

/// How often queued messages are checked for expiry
const REAPER_PERIOD: Duration = Duration::from_millis(100);

/// In-process message broker
///
/// Provides the broker semantics the coordination layer relies on: topic,
/// direct and fanout exchanges, default-exchange routing by queue name,
/// per-message TTL with dead-letter redirection, prefetch limited
/// consumers, ack / nack / reject, server-named auto-delete queues and
/// queue inspection. Messages live in memory only.
///
/// A background reaper expires queued messages; it stops when the last
/// handle to the broker is dropped. Construct inside a tokio runtime.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<BrokerState>,
    reaper: CancellationToken,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    consumers: HashMap<String, ConsumerEntry>,
    in_flight: HashMap<u64, InFlight>,
    next_delivery_tag: u64,
}

struct Exchange {
    kind: ExchangeKind,
    /// (queue, binding key)
    bindings: Vec<(String, String)>,
}

struct Queue {
    options: QueueOptions,
    ready: VecDeque<Message>,
    consumers: Vec<String>,
    notify: Arc<Notify>,
}

#[derive(Clone)]
struct Message {
    exchange: String,
    routing_key: String,
    body: Vec<u8>,
    expires_at: Option<Instant>,
    deliveries: u32,
    death: Option<Death>,
}

impl Message {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

struct ConsumerEntry {
    queue: String,
    prefetch: u16,
    auto_ack: bool,
    unsettled: usize,
    cancelled: bool,
}

struct InFlight {
    queue: String,
    consumer: String,
    message: Message,
}

enum Poll {
    Ready(Delivery),
    Wait(Option<Instant>),
    Closed,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_reaper_period(REAPER_PERIOD)
    }

    /// Creates a broker whose reaper runs every `period`
    pub fn with_reaper_period(period: Duration) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(BrokerState::default()),
            reaper: CancellationToken::new(),
        });

        let weak = Arc::downgrade(&inner);
        let token = inner.reaper.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.lock().expire_all(Instant::now());
                    }
                }
            }
            tracing::debug!("broker reaper stopped");
        });

        Self { inner }
    }

    /// Opens a broker for a `memory://` URL
    pub async fn connect(url: &str) -> BrokerResult<Self> {
        if url.starts_with("memory://") {
            tracing::info!(url, "using in-process broker");
            Ok(Self::new())
        } else {
            Err(BrokerError::UnsupportedUrl(url.to_string()))
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn poll_delivery(self: &Arc<Self>, tag: &str) -> Poll {
        let mut state = self.lock();
        let now = Instant::now();

        let (queue_name, prefetch, auto_ack, unsettled) = match state.consumers.get(tag) {
            Some(entry) if !entry.cancelled => (
                entry.queue.clone(),
                entry.prefetch,
                entry.auto_ack,
                entry.unsettled,
            ),
            _ => return Poll::Closed,
        };
        if !state.queues.contains_key(&queue_name) {
            return Poll::Closed;
        }

        state.expire(&queue_name, now);

        if prefetch > 0 && unsettled >= usize::from(prefetch) {
            return Poll::Wait(state.next_expiry(&queue_name));
        }

        let next = state
            .queues
            .get_mut(&queue_name)
            .and_then(|queue| queue.ready.pop_front());
        let Some(mut message) = next else {
            return Poll::Wait(state.next_expiry(&queue_name));
        };

        message.deliveries += 1;
        state.next_delivery_tag += 1;
        let delivery_tag = state.next_delivery_tag;
        let redelivered = message.deliveries > 1;
        let body = message.body.clone();
        let exchange = message.exchange.clone();
        let routing_key = message.routing_key.clone();
        let death = message.death.clone();

        let acker = if auto_ack {
            None
        } else {
            if let Some(entry) = state.consumers.get_mut(tag) {
                entry.unsettled += 1;
            }
            state.in_flight.insert(
                delivery_tag,
                InFlight {
                    queue: queue_name,
                    consumer: tag.to_string(),
                    message,
                },
            );
            let acker: Arc<dyn Acknowledger> = self.clone();
            Some(acker)
        };

        Poll::Ready(Delivery::new(
            delivery_tag,
            exchange,
            routing_key,
            body,
            redelivered,
            death,
            acker,
        ))
    }

    /// Stops a consumer; with `release` its entry is forgotten as well
    fn detach(&self, tag: &str, release: bool) -> bool {
        let mut state = self.lock();

        let queue_name = match state.consumers.get_mut(tag) {
            Some(entry) => {
                entry.cancelled = true;
                entry.queue.clone()
            }
            None => return false,
        };
        if release {
            state.consumers.remove(tag);
        }

        let delete = match state.queues.get_mut(&queue_name) {
            Some(queue) => {
                let before = queue.consumers.len();
                queue.consumers.retain(|c| c != tag);
                queue.notify.notify_waiters();
                queue.options.auto_delete && before > 0 && queue.consumers.is_empty()
            }
            None => false,
        };
        if delete {
            state.delete_queue(&queue_name);
        }
        true
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.reaper.cancel();
    }
}

impl Acknowledger for Inner {
    fn settle(&self, delivery_tag: u64, settlement: Settlement) -> BrokerResult<()> {
        let mut state = self.lock();

        let flight = state
            .in_flight
            .remove(&delivery_tag)
            .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))?;
        if let Some(entry) = state.consumers.get_mut(&flight.consumer) {
            entry.unsettled = entry.unsettled.saturating_sub(1);
        }

        let InFlight { queue, message, .. } = flight;
        match settlement {
            Settlement::Ack => {}
            Settlement::Nack { requeue: false } => {
                state.dead_letter(&queue, message, DeadLetterReason::Rejected);
            }
            Settlement::Nack { requeue: true } => {
                let limit = state
                    .queues
                    .get(&queue)
                    .and_then(|q| q.options.delivery_limit);
                match limit {
                    Some(limit) if message.deliveries >= limit => {
                        state.dead_letter(&queue, message, DeadLetterReason::DeliveryLimit);
                    }
                    _ => {
                        if let Some(q) = state.queues.get_mut(&queue) {
                            q.ready.push_front(message);
                        }
                    }
                }
            }
        }

        if let Some(q) = state.queues.get(&queue) {
            q.notify.notify_waiters();
        }
        Ok(())
    }
}

impl BrokerState {
    fn route(&mut self, exchange: &str, routing_key: &str, message: Message) -> BrokerResult<()> {
        let targets: Vec<String> = if exchange.is_empty() {
            vec![routing_key.to_string()]
        } else {
            let ex = self
                .exchanges
                .get(exchange)
                .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?;
            let mut targets: Vec<String> = Vec::new();
            for (queue, key) in &ex.bindings {
                let matched = match ex.kind {
                    ExchangeKind::Direct => key == routing_key,
                    ExchangeKind::Topic => topic_matches(key, routing_key),
                    ExchangeKind::Fanout => true,
                };
                if matched && !targets.contains(queue) {
                    targets.push(queue.clone());
                }
            }
            targets
        };

        let mut routed = false;
        for target in targets {
            if let Some(queue) = self.queues.get_mut(&target) {
                queue.ready.push_back(message.clone());
                queue.notify.notify_waiters();
                routed = true;
            }
        }
        if !routed {
            tracing::debug!(exchange, routing_key, "message unroutable, dropped");
        }
        Ok(())
    }

    fn dead_letter(&mut self, queue_name: &str, mut message: Message, reason: DeadLetterReason) {
        let options = match self.queues.get(queue_name) {
            Some(queue) if queue.options.dead_letters() => queue.options.clone(),
            _ => {
                tracing::debug!(queue = queue_name, %reason, "message discarded, no dead-letter target");
                return;
            }
        };

        let exchange = options.dead_letter_exchange.unwrap_or_default();
        let routing_key = options
            .dead_letter_routing_key
            .unwrap_or_else(|| message.routing_key.clone());

        message.death = Some(Death {
            reason,
            queue: queue_name.to_string(),
            deliveries: message.deliveries,
        });
        message.expires_at = None;
        message.deliveries = 0;
        message.exchange = exchange.clone();
        message.routing_key = routing_key.clone();

        tracing::debug!(queue = queue_name, %reason, target = %routing_key, "dead-lettering message");
        if let Err(e) = self.route(&exchange, &routing_key, message) {
            tracing::warn!(queue = queue_name, error = %e, "dead-letter routing failed");
        }
    }

    fn expire(&mut self, queue_name: &str, now: Instant) {
        let expired = match self.queues.get_mut(queue_name) {
            Some(queue) if queue.ready.iter().any(|m| m.is_expired(now)) => {
                let (expired, kept): (VecDeque<Message>, VecDeque<Message>) =
                    queue.ready.drain(..).partition(|m| m.is_expired(now));
                queue.ready = kept;
                expired
            }
            _ => return,
        };
        for message in expired {
            self.dead_letter(queue_name, message, DeadLetterReason::Expired);
        }
    }

    fn expire_all(&mut self, now: Instant) {
        let names: Vec<String> = self.queues.keys().cloned().collect();
        for name in names {
            self.expire(&name, now);
        }
    }

    fn next_expiry(&self, queue_name: &str) -> Option<Instant> {
        self.queues
            .get(queue_name)?
            .ready
            .iter()
            .filter_map(|m| m.expires_at)
            .min()
    }

    fn delete_queue(&mut self, queue_name: &str) {
        if let Some(queue) = self.queues.remove(queue_name) {
            queue.notify.notify_waiters();
        }
        for exchange in self.exchanges.values_mut() {
            exchange.bindings.retain(|(queue, _)| queue != queue_name);
        }
        tracing::debug!(queue = queue_name, "queue deleted");
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> BrokerResult<()> {
        if name.is_empty() {
            return Err(BrokerError::PreconditionFailed(
                "the default exchange cannot be declared".to_string(),
            ));
        }

        let mut state = self.inner.lock();
        match state.exchanges.get(name) {
            Some(existing) if existing.kind != kind => Err(BrokerError::PreconditionFailed(
                format!("exchange {} redeclared as {:?}", name, kind),
            )),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> BrokerResult<String> {
        let name = if name.is_empty() {
            format!("amq.gen-{}", Uuid::new_v4().simple())
        } else {
            name.to_string()
        };

        let mut state = self.inner.lock();
        match state.queues.get(&name) {
            Some(existing) if existing.options != options => {
                return Err(BrokerError::PreconditionFailed(format!(
                    "queue {} redeclared with different arguments",
                    name
                )));
            }
            Some(_) => {}
            None => {
                state.queues.insert(
                    name.clone(),
                    Queue {
                        options,
                        ready: VecDeque::new(),
                        consumers: Vec::new(),
                        notify: Arc::new(Notify::new()),
                    },
                );
            }
        }
        Ok(name)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        binding_key: &str,
    ) -> BrokerResult<()> {
        if exchange.is_empty() {
            return Err(BrokerError::PreconditionFailed(
                "queues cannot be bound to the default exchange".to_string(),
            ));
        }

        let mut state = self.inner.lock();
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::QueueNotFound(queue.to_string()));
        }
        let ex = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?;

        let binding = (queue.to_string(), binding_key.to_string());
        if !ex.bindings.contains(&binding) {
            ex.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> BrokerResult<()> {
        let message = Message {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            body: message.body,
            expires_at: message.expiration.map(|ttl| Instant::now() + ttl),
            deliveries: 0,
            death: None,
        };
        self.inner.lock().route(exchange, routing_key, message)
    }

    async fn consume(
        &self,
        queue: &str,
        options: ConsumeOptions,
    ) -> BrokerResult<Box<dyn Consumer>> {
        let mut state = self.inner.lock();
        let tag = options
            .tag
            .unwrap_or_else(|| format!("ctag-{}", Uuid::new_v4().simple()));
        if state.consumers.contains_key(&tag) {
            return Err(BrokerError::PreconditionFailed(format!(
                "consumer tag {} already in use",
                tag
            )));
        }

        let q = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        q.consumers.push(tag.clone());
        let notify = q.notify.clone();

        state.consumers.insert(
            tag.clone(),
            ConsumerEntry {
                queue: queue.to_string(),
                prefetch: options.prefetch,
                auto_ack: options.auto_ack,
                unsettled: 0,
                cancelled: false,
            },
        );

        Ok(Box::new(MemoryConsumer {
            tag,
            notify,
            inner: self.inner.clone(),
        }))
    }

    async fn cancel(&self, consumer_tag: &str) -> BrokerResult<()> {
        if self.inner.detach(consumer_tag, false) {
            Ok(())
        } else {
            Err(BrokerError::ConsumerNotFound(consumer_tag.to_string()))
        }
    }

    async fn queue_stats(&self, queue: &str) -> BrokerResult<QueueStats> {
        let mut state = self.inner.lock();
        state.expire(queue, Instant::now());
        let q = state
            .queues
            .get(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        Ok(QueueStats {
            name: queue.to_string(),
            messages: q.ready.len(),
            consumers: q.consumers.len(),
        })
    }
}

struct MemoryConsumer {
    tag: String,
    notify: Arc<Notify>,
    inner: Arc<Inner>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn next(&mut self) -> Option<Delivery> {
        let notify = self.notify.clone();
        loop {
            // Registered before polling so a publish in between is not missed
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = match self.inner.poll_delivery(&self.tag) {
                Poll::Ready(delivery) => return Some(delivery),
                Poll::Closed => return None,
                Poll::Wait(wake_at) => wake_at,
            };

            match wake_at {
                Some(deadline) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        self.inner.detach(&self.tag, true);
    }
}
