use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::errors::TeamResult;
use super::PipelineTask;
use crate::domain::messaging::topology::SIGHTING_EXCHANGE;
use crate::domain::messaging::{ConsumeOptions, Consumer, ExchangeKind, MessageBroker, QueueOptions};
use crate::domain::sighting::SightingMessage;
use crate::domain::team::Team;
use crate::hub::{Broadcaster, Fields};

/// Event type of a team lifecycle message
pub const TEAM_LOG: &str = "team log";

/// Event type of a sighting relayed by a team
pub const TEAM_SIGHTING: &str = "team sighting";

/// Read-only relay of the sightings a team is interested in
///
/// Each relay owns a private, server-named queue bound to the team's topics.
/// The consumer is attached on creation, so the queue goes away with the
/// relay even if it never starts listening.
pub struct TeamRelay {
    team: Team,
    queue: String,
    consumer: Box<dyn Consumer>,
    hub: Arc<dyn Broadcaster>,
}

impl TeamRelay {
    /// Declares, binds and subscribes to the team's queue, then announces the team
    pub async fn create(
        broker: Arc<dyn MessageBroker>,
        hub: Arc<dyn Broadcaster>,
        team: Team,
    ) -> TeamResult<Self> {
        broker
            .declare_exchange(SIGHTING_EXCHANGE, ExchangeKind::Topic)
            .await?;
        let queue = broker.declare_queue("", QueueOptions::transient()).await?;
        for topic in team.topics() {
            broker.bind_queue(&queue, SIGHTING_EXCHANGE, topic).await?;
        }
        let consumer = broker.consume(&queue, ConsumeOptions::auto_ack()).await?;

        tracing::info!(team = %team.name(), queue = %queue, topics = ?team.topics(), "team created");
        hub.broadcast(
            &format!(
                "Spawn team {}, sighting elements: [{}]",
                team.name(),
                team.categories().join(" ")
            ),
            TEAM_LOG,
            true,
            Fields::new(),
        )
        .await;

        Ok(Self {
            team,
            queue,
            consumer,
            hub,
        })
    }

    pub fn team(&self) -> &Team {
        &self.team
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Starts relaying until the subscription closes or the task is shut down
    pub fn listen(self) -> PipelineTask {
        PipelineTask::spawn("team relay", move |cancel| self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let delivery = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = self.consumer.next() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let sighting = match delivery.json::<SightingMessage>() {
                Ok(message) => message.sighting,
                Err(e) => {
                    tracing::warn!(team = %self.team.name(), error = %e, "malformed sighting dropped");
                    continue;
                }
            };

            tracing::debug!(team = %self.team.name(), pokemon = %sighting.pokemon, "team spotted sighting");
            self.hub
                .broadcast(
                    &format!(
                        "[{}] Spotted {} at {} [{}]!",
                        self.team.name(),
                        sighting.pokemon,
                        sighting.location,
                        sighting.category
                    ),
                    TEAM_SIGHTING,
                    true,
                    Fields::new(),
                )
                .await;
        }
        tracing::info!(team = %self.team.name(), "team relay stopped");
    }
}

/// Teams created at runtime, with their relay tasks
#[derive(Default)]
pub struct TeamRoster {
    teams: Mutex<Vec<(Team, PipelineTask)>>,
}

impl TeamRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, team: Team, task: PipelineTask) {
        self.teams.lock().await.push((team, task));
    }

    /// Teams whose relay is still running
    pub async fn list(&self) -> Vec<Team> {
        let mut teams = self.teams.lock().await;
        teams.retain(|(_, task)| !task.is_finished());
        teams.iter().map(|(team, _)| team.clone()).collect()
    }

    /// Stops every relay; their queues are deleted with them
    pub async fn shutdown_all(&self) -> usize {
        let teams = std::mem::take(&mut *self.teams.lock().await);
        let count = teams.len();
        for (_, task) in teams {
            task.shutdown().await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::messaging::OutboundMessage;
    use crate::domain::sighting::{sighting_topic, Sighting};
    use crate::hub::recording::RecordingBroadcaster;
    use crate::infrastructure::broker::InMemoryBroker;

    async fn publish(broker: &InMemoryBroker, sighting: Sighting) {
        broker
            .publish(
                SIGHTING_EXCHANGE,
                &sighting.topic(),
                OutboundMessage::json(&SightingMessage::new(sighting, Some(5))).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn relays_only_matching_categories() {
        let broker = InMemoryBroker::new();
        let hub = Arc::new(RecordingBroadcaster::default());
        let team = Team::new("Aqua", vec!["water".into(), "ice".into()]).unwrap();
        let relay = TeamRelay::create(Arc::new(broker.clone()), hub.clone(), team)
            .await
            .unwrap();
        let task = relay.listen();

        publish(&broker, Sighting::new("Squirtle", "Lake", "water")).await;
        publish(&broker, Sighting::new("Charmander", "Volcano", "fire")).await;
        broker
            .publish(SIGHTING_EXCHANGE, &sighting_topic("ice"), OutboundMessage::new("nope"))
            .await
            .unwrap();
        publish(&broker, Sighting::new("Lapras", "Sea", "ice")).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let created = hub.of_type(TEAM_LOG);
        assert_eq!(created[0]["message"], "Spawn team Aqua, sighting elements: [water ice]");
        let spotted: Vec<_> = hub
            .of_type(TEAM_SIGHTING)
            .into_iter()
            .map(|e| e["message"].clone())
            .collect();
        assert_eq!(
            spotted,
            [
                "[Aqua] Spotted Squirtle at Lake [water]!",
                "[Aqua] Spotted Lapras at Sea [ice]!"
            ]
        );
        task.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn queue_is_deleted_with_the_relay() {
        let broker = InMemoryBroker::new();
        let hub = Arc::new(RecordingBroadcaster::default());
        let team = Team::new("Magma", vec!["fire".into()]).unwrap();
        let relay = TeamRelay::create(Arc::new(broker.clone()), hub, team)
            .await
            .unwrap();
        let queue = relay.queue().to_string();
        assert!(queue.starts_with("amq.gen-"));

        let roster = TeamRoster::new();
        roster.add(relay.team().clone(), relay.listen()).await;
        assert_eq!(roster.list().await.len(), 1);

        assert_eq!(roster.shutdown_all().await, 1);
        assert!(roster.list().await.is_empty());
        assert!(broker.queue_stats(&queue).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unused_relay_takes_its_queue_along() {
        let broker = InMemoryBroker::new();
        let hub = Arc::new(RecordingBroadcaster::default());
        let team = Team::new("Galactic", vec!["dragon".into()]).unwrap();
        let relay = TeamRelay::create(Arc::new(broker.clone()), hub, team)
            .await
            .unwrap();
        let queue = relay.queue().to_string();
        assert_eq!(broker.queue_stats(&queue).await.unwrap().consumers, 1);

        drop(relay);

        assert!(matches!(
            broker.queue_stats(&queue).await,
            Err(crate::domain::messaging::BrokerError::QueueNotFound(_))
        ));
    }
}
