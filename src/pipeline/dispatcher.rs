use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::errors::{DispatchError, DispatchResult};
use super::PipelineTask;
use crate::agents::Chance;
use crate::domain::messaging::topology::{
    task_queue_options, DEFAULT_EXCHANGE, SIGHTING_EXCHANGE, SIGHTING_QUEUE, TASK_QUEUE,
};
use crate::domain::messaging::{
    ConsumeOptions, Consumer, ExchangeKind, MessageBroker, OutboundMessage, QueueOptions,
};
use crate::domain::sighting::SightingMessage;
use crate::domain::task::{CaptureTask, TaskIdCounter, DEADLINE_RANGE};
use crate::hub::{fields, Broadcaster};

/// Event type of a dispatched capture task
pub const DISPATCH_LOG: &str = "headquarter dispatch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Name shown in dispatch events
    pub name: String,
    /// Binding keys of the sighting queue on the topic exchange
    pub topics: Vec<String>,
    /// Pause before each sighting is dispatched
    pub delay: Duration,
    pub delivery_limit: Option<u32>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            name: "RocketHeadQuater".to_string(),
            topics: vec!["pokemon.sighting.#".to_string()],
            delay: Duration::from_millis(500),
            delivery_limit: None,
        }
    }
}

/// Headquarters: turns sightings into capture tasks with a deadline
///
/// Task ids come from a counter owned by this dispatcher; run a single
/// dispatcher per process to keep them unique.
pub struct Dispatcher {
    broker: Arc<dyn MessageBroker>,
    hub: Arc<dyn Broadcaster>,
    chance: Arc<dyn Chance>,
    counter: TaskIdCounter,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        hub: Arc<dyn Broadcaster>,
        chance: Arc<dyn Chance>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            broker,
            hub,
            chance,
            counter: TaskIdCounter::new(),
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Number of task ids handed out so far
    pub fn issued(&self) -> u64 {
        self.counter.issued()
    }

    /// Declares the exchange, both queues and the sighting bindings
    ///
    /// Every declaration is idempotent, so calling this again is harmless.
    pub async fn declare(&self) -> DispatchResult<()> {
        self.broker
            .declare_exchange(SIGHTING_EXCHANGE, ExchangeKind::Topic)
            .await?;
        self.broker
            .declare_queue(SIGHTING_QUEUE, QueueOptions::durable())
            .await?;
        self.broker
            .declare_queue(TASK_QUEUE, task_queue_options(self.settings.delivery_limit))
            .await?;
        for topic in &self.settings.topics {
            self.broker
                .bind_queue(SIGHTING_QUEUE, SIGHTING_EXCHANGE, topic)
                .await?;
        }
        Ok(())
    }

    /// Declares the topology and starts consuming sightings
    pub async fn setup(self: Arc<Self>) -> DispatchResult<PipelineTask> {
        self.declare().await?;
        let consumer = self
            .broker
            .consume(SIGHTING_QUEUE, ConsumeOptions::auto_ack())
            .await?;

        tracing::info!(
            dispatcher = %self.settings.name,
            topics = ?self.settings.topics,
            "dispatcher listening"
        );
        Ok(PipelineTask::spawn("dispatcher", move |cancel| {
            self.run(consumer, cancel)
        }))
    }

    async fn run(self: Arc<Self>, mut consumer: Box<dyn Consumer>, cancel: CancellationToken) {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = consumer.next() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let message: SightingMessage = match delivery.json() {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, routing_key = %delivery.routing_key, "malformed sighting dropped");
                    continue;
                }
            };

            tokio::time::sleep(self.settings.delay).await;
            match self.dispatch(message).await {
                Ok(task) => {
                    tracing::debug!(task_id = task.task_id, deadline = task.deadline_seconds, "capture task dispatched");
                }
                Err(DispatchError::InvalidSighting(reason)) => {
                    tracing::warn!(reason = %reason, "invalid sighting dropped");
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to dispatch capture task");
                }
            }
        }
        tracing::info!(dispatcher = %self.settings.name, "dispatcher stopped");
    }

    /// Creates the capture task for one sighting and publishes it
    ///
    /// The deadline is the sighting's own capture time when it has one,
    /// otherwise a random number of seconds in [`DEADLINE_RANGE`]; it
    /// becomes the task's time-to-live on the work queue.
    pub async fn dispatch(&self, message: SightingMessage) -> DispatchResult<CaptureTask> {
        let SightingMessage {
            sighting,
            capture_time,
        } = message;
        sighting.validate().map_err(DispatchError::InvalidSighting)?;

        let deadline = capture_time
            .filter(|seconds| *seconds > 0)
            .unwrap_or_else(|| self.chance.pick(DEADLINE_RANGE));
        let task = CaptureTask::new(self.counter.next_id(), sighting, deadline);

        self.hub
            .broadcast(
                &format!(
                    "[{}] Dispatch capture task - {} at {} [{}]!",
                    self.settings.name,
                    task.sighting.pokemon,
                    task.sighting.location,
                    task.sighting.category
                ),
                DISPATCH_LOG,
                true,
                fields(json!({"taskId": task.task_id, "deadline": deadline})),
            )
            .await;

        let outbound = OutboundMessage::json(&task)?
            .persistent()
            .with_expiration(task.expiration());
        self.broker
            .publish(DEFAULT_EXCHANGE, TASK_QUEUE, outbound)
            .await?;
        Ok(task)
    }
}
