use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::agents::AgentSnapshot;
use crate::api::errors::ApiError;
use crate::api::state::AppState;

/// Request body for spawning a rocket agent
#[derive(Debug, Deserialize)]
pub struct SpawnAgentRequest {
    pub id: u32,
    pub name: String,
    #[serde(rename = "imageNum", default)]
    pub image_num: u32,
}

/// Response from agent creation
#[derive(Debug, Serialize)]
pub struct SpawnAgentResponse {
    #[serde(flatten)]
    pub agent: AgentSnapshot,
    pub message: String,
}

/// Spawn a rocket agent and start it listening
///
/// POST /spawn/rocket-agent
pub async fn spawn_rocket_agent(
    State(state): State<AppState>,
    payload: Result<Json<SpawnAgentRequest>, JsonRejection>,
) -> Result<Json<SpawnAgentResponse>, ApiError> {
    let Json(req) = payload?;

    let agent = state.agents.spawn(req.id, req.name, req.image_num).await?;

    Ok(Json(SpawnAgentResponse {
        agent,
        message: "Successfully created a Rocket agent".to_string(),
    }))
}

/// Stop every agent
///
/// GET /reset/agents
pub async fn reset_agents(State(state): State<AppState>) -> StatusCode {
    let stopped = state.agents.stop_all().await;
    tracing::info!(stopped, "agents reset");
    StatusCode::NO_CONTENT
}

/// Stop every agent and zero the dead-letter counter
///
/// GET /reset/system
pub async fn reset_system(State(state): State<AppState>) -> StatusCode {
    let stopped = state.agents.stop_all().await;
    state.dead_letters.reset();
    tracing::info!(stopped, "system reset");
    StatusCode::NO_CONTENT
}
