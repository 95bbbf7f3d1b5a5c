use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::chance::Chance;
use super::errors::{AgentError, AgentResult};
use super::state::AgentState;
use crate::domain::messaging::topology::{task_queue_options, TASK_QUEUE};
use crate::domain::messaging::{ConsumeOptions, Consumer, Delivery, MessageBroker};
use crate::domain::task::CaptureTask;
use crate::hub::{Broadcaster, Fields};

/// Event type of every agent broadcast
pub const AGENT_LOG: &str = "agent log";

/// Work units a capture takes, picked per task
const WORK_UNITS: RangeInclusive<u32> = 2..=4;

/// Tunables shared by every agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentSettings {
    /// Wall time of one work unit
    pub work_unit: Duration,
    /// A capture fails with probability `1 / failure_odds` (`0` = never)
    pub failure_odds: u32,
    /// How long `stop` waits for the in-flight task before force-closing
    pub drain_timeout: Duration,
    /// Delivery limit of the work queue
    pub delivery_limit: Option<u32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            work_unit: Duration::from_secs(1),
            failure_odds: 5,
            drain_timeout: Duration::from_secs(30),
            delivery_limit: None,
        }
    }
}

/// Collaborators every agent is built with
#[derive(Clone)]
pub struct AgentContext {
    pub broker: Arc<dyn MessageBroker>,
    pub hub: Arc<dyn Broadcaster>,
    pub chance: Arc<dyn Chance>,
    pub settings: AgentSettings,
}

/// Read-only view of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: u32,
    pub name: String,
    #[serde(rename = "imageNum")]
    pub image_num: u32,
    pub state: AgentState,
}

/// Part of an agent shared with its processing loop
struct AgentCore {
    id: u32,
    name: String,
    context: AgentContext,
    state: watch::Sender<AgentState>,
}

impl AgentCore {
    /// Moves to `next` if the lifecycle allows it
    fn transition(&self, next: AgentState) -> bool {
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                tracing::debug!(agent_id = self.id, from = %current, to = %next, "state transition skipped");
                false
            }
        })
    }

    async fn announce(&self, message: String, status: &str, task_id: Option<u64>, mut extra: Fields) {
        extra.insert("id".to_string(), json!(self.id));
        extra.insert("name".to_string(), json!(self.name));
        extra.insert("status".to_string(), json!(status));
        if let Some(task_id) = task_id {
            extra.insert("taskId".to_string(), json!(task_id));
        }
        self.context.hub.broadcast(&message, AGENT_LOG, true, extra).await;
    }

    fn label(&self) -> String {
        format!("[{} ID | {}]", self.id, self.name)
    }

    /// Consumes capture tasks one at a time until stopped or cancelled
    async fn run(self: Arc<Self>, mut consumer: Box<dyn Consumer>, stop: CancellationToken) {
        tracing::info!(agent_id = self.id, consumer = consumer.tag(), "agent listening");
        loop {
            let delivery = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                next = consumer.next() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            self.transition(AgentState::Processing);
            self.process(delivery).await;
            if *self.state.borrow() == AgentState::Processing {
                self.transition(AgentState::Listening);
            }
        }
        tracing::info!(agent_id = self.id, "agent processing loop exited");
    }

    async fn process(&self, delivery: Delivery) {
        let task: CaptureTask = match delivery.json() {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(agent_id = self.id, error = %e, "malformed capture task, rejecting");
                if let Err(e) = delivery.reject() {
                    tracing::error!(agent_id = self.id, error = %e, "failed to reject capture task");
                }
                self.announce(
                    format!("{} Agent rejected malformed task", self.label()),
                    "rejected",
                    None,
                    Fields::new(),
                )
                .await;
                return;
            }
        };

        let settings = self.context.settings;
        let sighting = &task.sighting;
        self.announce(
            format!(
                "{} Agent processing task: {} at {}",
                self.label(),
                sighting.pokemon,
                sighting.location
            ),
            "accepted",
            Some(task.task_id),
            Fields::new(),
        )
        .await;

        let units = self.context.chance.pick(WORK_UNITS);
        tracing::debug!(agent_id = self.id, task_id = task.task_id, units, "capture started");
        self.announce(
            format!(
                "{} Agent started task (estimated duration: {}): {} at {}",
                self.label(),
                units,
                sighting.pokemon,
                sighting.location
            ),
            "processing",
            Some(task.task_id),
            Fields::from_iter([("duration".to_string(), Value::from(units))]),
        )
        .await;

        tokio::time::sleep(settings.work_unit * units).await;

        if self.context.chance.one_in(settings.failure_odds) {
            self.announce(
                format!(
                    "{} Agent failed task: {} at {}",
                    self.label(),
                    sighting.pokemon,
                    sighting.location
                ),
                "failed",
                Some(task.task_id),
                Fields::new(),
            )
            .await;
            if let Err(e) = delivery.nack(true) {
                tracing::error!(agent_id = self.id, task_id = task.task_id, error = %e, "failed to requeue capture task");
            }
            self.announce(
                format!(
                    "{} Agent reported failed task and request HQ to re-dispatch: {} at {}",
                    self.label(),
                    sighting.pokemon,
                    sighting.location
                ),
                "requeued",
                Some(task.task_id),
                Fields::new(),
            )
            .await;
            return;
        }

        if let Err(e) = delivery.ack() {
            tracing::error!(agent_id = self.id, task_id = task.task_id, error = %e, "failed to acknowledge capture task");
        }
        self.announce(
            format!(
                "{} Agent captured {} at {} [{}]!",
                self.label(),
                sighting.pokemon,
                sighting.location,
                sighting.category
            ),
            "captured",
            Some(task.task_id),
            Fields::new(),
        )
        .await;
    }
}

/// Worker that captures pokemon from the shared work queue
///
/// Holds at most one capture task at a time. Stopping consumes the agent,
/// so a stop can only ever be requested once.
pub struct RocketAgent {
    core: Arc<AgentCore>,
    image_num: u32,
    consumer_tag: String,
    stop: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl RocketAgent {
    /// Declares the work queue and announces the new agent
    pub async fn spawn(
        context: AgentContext,
        id: u32,
        name: impl Into<String>,
        image_num: u32,
    ) -> AgentResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AgentError::InvalidAgent("Agent name cannot be empty".to_string()));
        }

        context
            .broker
            .declare_queue(TASK_QUEUE, task_queue_options(context.settings.delivery_limit))
            .await?;

        let (state, _) = watch::channel(AgentState::Created);
        let consumer_tag = format!("agent-{}-{}", id, name);
        let core = Arc::new(AgentCore {
            id,
            name,
            context,
            state,
        });

        tracing::info!(agent_id = id, name = %core.name, "rocket agent spawned");
        core.announce(
            format!("Spawn rocket agent {}, {}", id, core.name),
            "spawned",
            None,
            Fields::new(),
        )
        .await;

        Ok(Self {
            core,
            image_num,
            consumer_tag,
            stop: CancellationToken::new(),
            worker: None,
        })
    }

    /// Starts consuming with a prefetch of one; processing runs on its own task
    pub async fn listen(&mut self) -> AgentResult<()> {
        if self.worker.is_some() {
            return Err(AgentError::AlreadyListening(self.core.id));
        }

        let consumer = self
            .core
            .context
            .broker
            .consume(TASK_QUEUE, ConsumeOptions::manual(self.consumer_tag.clone(), 1))
            .await?;

        self.core.transition(AgentState::Listening);
        let core = self.core.clone();
        self.worker = Some(tokio::spawn(core.run(consumer, self.stop.clone())));
        Ok(())
    }

    /// Cancels the subscription and waits for the in-flight task to finish
    ///
    /// The wait is bounded by the drain timeout; past it the processing task
    /// is aborted and its unsettled task returns to the queue.
    pub async fn stop(mut self) {
        let id = self.core.id;
        self.core.transition(AgentState::Stopping);

        if self.worker.is_some() {
            if let Err(e) = self.core.context.broker.cancel(&self.consumer_tag).await {
                tracing::debug!(agent_id = id, error = %e, "consumer already gone");
            }
        }
        self.stop.cancel();

        if let Some(mut worker) = self.worker.take() {
            let drain = self.core.context.settings.drain_timeout;
            match tokio::time::timeout(drain, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(agent_id = id, error = %e, "agent processing task failed");
                }
                Err(_) => {
                    tracing::warn!(agent_id = id, drain_ms = drain.as_millis() as u64, "drain timed out, force closing agent");
                    worker.abort();
                    let _ = worker.await;
                }
            }
        }

        self.core.transition(AgentState::Stopped);
        tracing::info!(agent_id = id, "rocket agent stopped");
        self.core
            .announce(
                format!("Stopped rocket agent {}, {}", id, self.core.name),
                "stopped",
                None,
                Fields::new(),
            )
            .await;
    }

    pub fn id(&self) -> u32 {
        self.core.id
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn state(&self) -> AgentState {
        *self.core.state.borrow()
    }

    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.core.id,
            name: self.core.name.clone(),
            image_num: self.image_num,
            state: self.state(),
        }
    }
}

impl Drop for RocketAgent {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::chance::ScriptedChance;
    use crate::domain::messaging::topology::DEAD_LETTER_QUEUE;
    use crate::domain::messaging::{DeadLetterReason, OutboundMessage};
    use crate::domain::sighting::Sighting;
    use crate::hub::recording::RecordingBroadcaster;
    use crate::infrastructure::broker::InMemoryBroker;

    struct Fixture {
        broker: InMemoryBroker,
        hub: Arc<RecordingBroadcaster>,
        context: AgentContext,
    }

    async fn fixture(script: Vec<u32>, settings: AgentSettings) -> Fixture {
        let broker = InMemoryBroker::new();
        broker
            .declare_queue(DEAD_LETTER_QUEUE, crate::domain::messaging::QueueOptions::durable())
            .await
            .unwrap();
        let hub = Arc::new(RecordingBroadcaster::default());
        let context = AgentContext {
            broker: Arc::new(broker.clone()),
            hub: hub.clone(),
            chance: Arc::new(ScriptedChance::new(script)),
            settings,
        };
        Fixture {
            broker,
            hub,
            context,
        }
    }

    fn settings() -> AgentSettings {
        AgentSettings {
            work_unit: Duration::from_secs(1),
            failure_odds: 5,
            drain_timeout: Duration::from_secs(30),
            delivery_limit: None,
        }
    }

    async fn publish_task(broker: &InMemoryBroker, task_id: u64) {
        let task = CaptureTask::new(task_id, Sighting::new("Pikachu", "Park", "electric"), 60);
        let message = OutboundMessage::json(&task)
            .unwrap()
            .with_expiration(task.expiration());
        broker.publish("", TASK_QUEUE, message).await.unwrap();
    }

    async fn wait_for(hub: &RecordingBroadcaster, status: &str, count: usize) {
        tokio::time::timeout(Duration::from_secs(120), async {
            while hub.with_status(status).len() < count {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("waiting for {} x {}", count, status));
    }

    #[tokio::test(start_paused = true)]
    async fn spawn_announces_and_declares_work_queue() {
        let f = fixture(vec![3], settings()).await;
        let agent = RocketAgent::spawn(f.context.clone(), 1, "Jessie", 2).await.unwrap();

        assert_eq!(agent.state(), AgentState::Created);
        let spawned = f.hub.with_status("spawned");
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0]["type"], AGENT_LOG);
        assert_eq!(spawned[0]["id"], 1);
        assert!(f.broker.queue_stats(TASK_QUEUE).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn blank_name_is_rejected() {
        let f = fixture(vec![3], settings()).await;
        let result = RocketAgent::spawn(f.context.clone(), 1, " ", 0).await;

        assert!(matches!(result, Err(AgentError::InvalidAgent(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_capture_acknowledges_task() {
        let f = fixture(vec![3], settings()).await;
        let mut agent = RocketAgent::spawn(f.context.clone(), 1, "Jessie", 2).await.unwrap();
        agent.listen().await.unwrap();
        publish_task(&f.broker, 0).await;

        wait_for(&f.hub, "captured", 1).await;

        let processing = f.hub.with_status("processing");
        assert_eq!(processing[0]["taskId"], 0);
        assert_eq!(processing[0]["duration"], 3);
        assert_eq!(f.hub.with_status("captured")[0]["taskId"], 0);
        assert_eq!(f.broker.queue_stats(TASK_QUEUE).await.unwrap().messages, 0);
        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn task_is_announced_before_the_work_sleep() {
        let f = fixture(vec![3], settings()).await;
        let mut agent = RocketAgent::spawn(f.context.clone(), 1, "Jessie", 2).await.unwrap();
        agent.listen().await.unwrap();
        publish_task(&f.broker, 4).await;

        wait_for(&f.hub, "processing", 1).await;

        // Three work units of one second each are still pending
        assert!(f.hub.with_status("captured").is_empty());
        let events = f.hub.events();
        let accepted = events
            .iter()
            .position(|e| e.get("status") == Some(&json!("accepted")))
            .expect("accepted event");
        let processing = events
            .iter()
            .position(|e| e.get("status") == Some(&json!("processing")))
            .expect("processing event");
        assert!(accepted < processing);
        assert_eq!(
            events[accepted]["message"],
            "[1 ID | Jessie] Agent processing task: Pikachu at Park"
        );
        assert_eq!(events[accepted]["taskId"], 4);
        assert_eq!(
            events[processing]["message"],
            "[1 ID | Jessie] Agent started task (estimated duration: 3): Pikachu at Park"
        );
        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_capture_requeues_task() {
        // Duration clamps to 2 units, roll of 1 fails
        let f = fixture(vec![1], settings()).await;
        let mut agent = RocketAgent::spawn(f.context.clone(), 1, "James", 0).await.unwrap();
        agent.listen().await.unwrap();
        publish_task(&f.broker, 5).await;

        wait_for(&f.hub, "requeued", 2).await;
        agent.stop().await;

        assert!(f.hub.with_status("captured").is_empty());
        assert_eq!(f.hub.with_status("failed")[0]["taskId"], 5);
        assert_eq!(f.broker.queue_stats(TASK_QUEUE).await.unwrap().messages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_task_is_rejected_to_dead_letters() {
        let f = fixture(vec![3], settings()).await;
        let mut agent = RocketAgent::spawn(f.context.clone(), 1, "Meowth", 0).await.unwrap();
        agent.listen().await.unwrap();
        f.broker
            .publish("", TASK_QUEUE, OutboundMessage::new("not json"))
            .await
            .unwrap();

        let mut dead = f
            .broker
            .consume(DEAD_LETTER_QUEUE, ConsumeOptions::auto_ack())
            .await
            .unwrap();
        let delivery = tokio::time::timeout(Duration::from_secs(10), dead.next())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            delivery.death.as_ref().map(|d| d.reason),
            Some(DeadLetterReason::Rejected)
        );
        assert!(f.hub.with_status("processing").is_empty());
        agent.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn one_task_in_flight_at_a_time() {
        let f = fixture(vec![3], settings()).await;
        let mut agent = RocketAgent::spawn(f.context.clone(), 1, "Jessie", 0).await.unwrap();
        for id in 0..3 {
            publish_task(&f.broker, id).await;
        }
        agent.listen().await.unwrap();

        wait_for(&f.hub, "captured", 3).await;
        agent.stop().await;

        let mut open = 0;
        for event in f.hub.events() {
            match event.get("status").and_then(|s| s.as_str()) {
                Some("processing") => {
                    open += 1;
                    assert_eq!(open, 1, "two tasks in flight");
                }
                Some("captured") | Some("failed") => open -= 1,
                _ => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drains_the_task_in_flight() {
        let f = fixture(vec![4, 3], settings()).await;
        let mut agent = RocketAgent::spawn(f.context.clone(), 1, "Jessie", 0).await.unwrap();
        agent.listen().await.unwrap();
        publish_task(&f.broker, 0).await;
        wait_for(&f.hub, "processing", 1).await;

        agent.stop().await;

        let statuses: Vec<String> = f
            .hub
            .events()
            .iter()
            .filter_map(|e| e.get("status").and_then(|s| s.as_str()).map(String::from))
            .collect();
        assert_eq!(statuses, ["spawned", "accepted", "processing", "captured", "stopped"]);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_timeout_force_closes_and_requeues() {
        let mut short = settings();
        short.drain_timeout = Duration::from_secs(1);
        let f = fixture(vec![4, 3], short).await;
        let mut agent = RocketAgent::spawn(f.context.clone(), 1, "Jessie", 0).await.unwrap();
        agent.listen().await.unwrap();
        publish_task(&f.broker, 0).await;
        wait_for(&f.hub, "processing", 1).await;

        agent.stop().await;

        assert!(f.hub.with_status("captured").is_empty());
        assert_eq!(f.hub.with_status("stopped").len(), 1);
        assert_eq!(f.broker.queue_stats(TASK_QUEUE).await.unwrap().messages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn listen_twice_fails() {
        let f = fixture(vec![3], settings()).await;
        let mut agent = RocketAgent::spawn(f.context.clone(), 1, "Jessie", 0).await.unwrap();
        agent.listen().await.unwrap();

        assert!(matches!(
            agent.listen().await,
            Err(AgentError::AlreadyListening(1))
        ));
        agent.stop().await;
    }
}
