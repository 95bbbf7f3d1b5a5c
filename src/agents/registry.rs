use tokio::sync::Mutex;

use super::errors::{AgentError, AgentResult};
use super::worker::{AgentContext, AgentSnapshot, RocketAgent};

/// Every running rocket agent, keyed by id
///
/// Spawning and stopping are serialized by one lock, so two requests for the
/// same id cannot both succeed.
pub struct AgentRegistry {
    context: AgentContext,
    agents: Mutex<Vec<RocketAgent>>,
}

impl AgentRegistry {
    pub fn new(context: AgentContext) -> Self {
        Self {
            context,
            agents: Mutex::new(Vec::new()),
        }
    }

    /// Spawns an agent, starts it listening and registers it
    pub async fn spawn(
        &self,
        id: u32,
        name: impl Into<String>,
        image_num: u32,
    ) -> AgentResult<AgentSnapshot> {
        let mut agents = self.agents.lock().await;
        if agents.iter().any(|agent| agent.id() == id) {
            return Err(AgentError::DuplicateAgent(id));
        }

        let mut agent = RocketAgent::spawn(self.context.clone(), id, name, image_num).await?;
        if let Err(e) = agent.listen().await {
            agent.stop().await;
            return Err(e);
        }

        let snapshot = agent.snapshot();
        agents.push(agent);
        tracing::info!(agent_id = id, agents = agents.len(), "agent registered");
        Ok(snapshot)
    }

    /// Stops and forgets one agent
    pub async fn stop(&self, id: u32) -> AgentResult<()> {
        let agent = {
            let mut agents = self.agents.lock().await;
            let index = agents
                .iter()
                .position(|agent| agent.id() == id)
                .ok_or(AgentError::AgentNotFound(id))?;
            agents.remove(index)
        };
        agent.stop().await;
        Ok(())
    }

    /// Stops every agent and clears the registry, returning how many were stopped
    pub async fn stop_all(&self) -> usize {
        let agents = std::mem::take(&mut *self.agents.lock().await);
        let count = agents.len();
        futures::future::join_all(agents.into_iter().map(RocketAgent::stop)).await;
        if count > 0 {
            tracing::info!(count, "all agents stopped");
        }
        count
    }

    pub async fn snapshot(&self) -> Vec<AgentSnapshot> {
        self.agents
            .lock()
            .await
            .iter()
            .map(RocketAgent::snapshot)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
