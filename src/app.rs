use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::task::JoinHandle;

use crate::agents::{AgentContext, AgentRegistry, Chance};
use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::domain::messaging::MessageBroker;
use crate::hub::{Broadcaster, Hub};
use crate::pipeline::{DeadLetterMonitor, Dispatcher, PipelineTask, TeamRoster};

/// The running coordination layer: hub, subscribers and shared state
pub struct App {
    state: AppState,
    tasks: Vec<PipelineTask>,
    hub_task: JoinHandle<()>,
}

impl App {
    /// Starts the hub, the dead-letter monitor and the dispatcher
    ///
    /// The dead-letter queue is declared before the work queue that
    /// redirects into it.
    pub async fn bootstrap(
        config: &AppConfig,
        broker: Arc<dyn MessageBroker>,
        chance: Arc<dyn Chance>,
    ) -> anyhow::Result<Self> {
        let (hub, hub_task) = Hub::spawn(config.hub_command_capacity);
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(hub.clone());

        let dead_letters = Arc::new(DeadLetterMonitor::new(broker.clone(), broadcaster.clone()));
        let dead_letter_task = dead_letters
            .clone()
            .setup()
            .await
            .context("dead-letter monitor setup failed")?;

        let dispatcher = Arc::new(Dispatcher::new(
            broker.clone(),
            broadcaster.clone(),
            chance.clone(),
            config.dispatcher.clone(),
        ));
        let dispatch_task = dispatcher
            .setup()
            .await
            .context("dispatcher setup failed")?;

        let agents = Arc::new(AgentRegistry::new(AgentContext {
            broker: broker.clone(),
            hub: broadcaster,
            chance: chance.clone(),
            settings: config.agents,
        }));

        let state = AppState {
            broker,
            hub,
            chance,
            agents,
            teams: Arc::new(TeamRoster::new()),
            dead_letters,
            viewer: config.viewer,
        };

        tracing::info!("coordination layer started");
        Ok(Self {
            state,
            tasks: vec![dead_letter_task, dispatch_task],
            hub_task,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        api::router(self.state.clone())
    }

    /// Drains every agent, then stops teams, subscribers and the hub
    pub async fn shutdown(self) {
        let agents = self.state.agents.stop_all().await;
        let teams = self.state.teams.shutdown_all().await;
        for task in self.tasks {
            task.shutdown().await;
        }
        drop(self.state);
        self.hub_task.abort();
        tracing::info!(agents, teams, "coordination layer stopped");
    }
}
