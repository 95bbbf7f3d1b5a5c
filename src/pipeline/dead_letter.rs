use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::PipelineTask;
use crate::domain::messaging::topology::DEAD_LETTER_QUEUE;
use crate::domain::messaging::{BrokerResult, ConsumeOptions, Consumer, MessageBroker, QueueOptions};
use crate::domain::task::CaptureTask;
use crate::hub::{Broadcaster, Fields};

/// Event type of a missed capture
pub const ESCAPE_LOG: &str = "pokemon escape";

/// Counts capture tasks that expired or were rejected
pub struct DeadLetterMonitor {
    broker: Arc<dyn MessageBroker>,
    hub: Arc<dyn Broadcaster>,
    missed: AtomicU64,
}

impl DeadLetterMonitor {
    pub fn new(broker: Arc<dyn MessageBroker>, hub: Arc<dyn Broadcaster>) -> Self {
        Self {
            broker,
            hub,
            missed: AtomicU64::new(0),
        }
    }

    /// Declares the dead-letter queue and starts consuming it
    pub async fn setup(self: Arc<Self>) -> BrokerResult<PipelineTask> {
        self.broker
            .declare_queue(DEAD_LETTER_QUEUE, QueueOptions::durable())
            .await?;
        let consumer = self
            .broker
            .consume(DEAD_LETTER_QUEUE, ConsumeOptions::auto_ack())
            .await?;

        tracing::info!(queue = DEAD_LETTER_QUEUE, "dead-letter monitor listening");
        Ok(PipelineTask::spawn("dead-letter monitor", move |cancel| {
            self.run(consumer, cancel)
        }))
    }

    /// Missed tasks observed since start or the last reset
    pub fn count(&self) -> u64 {
        self.missed.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        let previous = self.missed.swap(0, Ordering::SeqCst);
        tracing::info!(previous, "dead-letter counter reset");
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

            let task: CaptureTask = match delivery.json() {
                Ok(task) => task,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed dead letter dropped");
                    continue;
                }
            };

            let total = self.missed.fetch_add(1, Ordering::SeqCst) + 1;
            let reason = delivery.death.as_ref().map(|death| death.reason);
            tracing::info!(task_id = task.task_id, reason = ?reason, total, "capture task missed");

            let mut extra = Fields::new();
            extra.insert("taskId".to_string(), task.task_id.into());
            if let Some(reason) = reason {
                extra.insert("reason".to_string(), reason.to_string().into());
            }
            self.hub
                .broadcast(
                    &format!(
                        "[DLQ] Missed opportunity! {} escaped from {} ({})",
                        task.sighting.pokemon, task.sighting.location, task.sighting.category
                    ),
                    ESCAPE_LOG,
                    true,
                    extra,
                )
                .await;
        }
        tracing::info!("dead-letter monitor stopped");
    }
}
