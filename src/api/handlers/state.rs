use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::agents::AgentSnapshot;
use crate::api::errors::ApiError;
use crate::api::state::AppState;
use crate::domain::messaging::QueueStats;
use crate::domain::team::Team;

/// Request body for a queue inspection
#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

/// Pending messages and consumers of a queue
///
/// POST /state/queue
pub async fn queue_stats(
    State(state): State<AppState>,
    payload: Result<Json<QueueRequest>, JsonRejection>,
) -> Result<Json<QueueStats>, ApiError> {
    let Json(req) = payload?;
    let stats = state.broker.queue_stats(&req.name).await?;
    Ok(Json(stats))
}

/// Capture tasks missed since start or the last reset
///
/// GET /state/dead-message
pub async fn dead_message_count(State(state): State<AppState>) -> Json<CountResponse> {
    Json(CountResponse {
        count: state.dead_letters.count(),
    })
}

/// Connected viewers
///
/// GET /state/hub/active
pub async fn live_viewer_count(
    State(state): State<AppState>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state.hub.live_count().await?;
    Ok(Json(CountResponse {
        count: count as u64,
    }))
}

/// GET /state/agents
pub async fn agents_state(State(state): State<AppState>) -> Json<Vec<AgentSnapshot>> {
    Json(state.agents.snapshot().await)
}

/// GET /state/teams
pub async fn teams_state(State(state): State<AppState>) -> Json<Vec<Team>> {
    Json(state.teams.list().await)
}
