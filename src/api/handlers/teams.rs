use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;
use crate::api::state::AppState;
use crate::domain::team::Team;
use crate::pipeline::{TeamError, TeamRelay};

/// Request body for creating a team
#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    #[serde(alias = "categories", default)]
    pub elements: Vec<String>,
}

/// Response from team creation
#[derive(Debug, Serialize)]
pub struct TeamResponse {
    #[serde(flatten)]
    pub team: Team,
    pub message: String,
}

/// Create a team relay and start it in the background
///
/// POST /spawn/team
pub async fn spawn_team(
    State(state): State<AppState>,
    payload: Result<Json<CreateTeamRequest>, JsonRejection>,
) -> Result<Json<TeamResponse>, ApiError> {
    let Json(req) = payload?;
    let team = Team::new(req.name, req.elements).map_err(TeamError::InvalidTeam)?;

    let relay = TeamRelay::create(state.broker.clone(), Arc::new(state.hub.clone()), team).await?;
    let team = relay.team().clone();
    let task = relay.listen();
    state.teams.add(team.clone(), task).await;

    Ok(Json(TeamResponse {
        team,
        message: "Successfully created a Team".to_string(),
    }))
}
