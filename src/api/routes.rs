use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{agents, health, sightings, state, stream, teams};
use super::state::AppState;

/// Builds the HTTP surface over `state`
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Heartbeat
        .route("/ping", get(health::health_check))
        .route("/health", get(health::health_check))
        // Producers and spawning
        .route("/sighting", post(sightings::submit_sighting))
        .route("/spawn/rocket-agent", post(agents::spawn_rocket_agent))
        .route("/spawn/team", post(teams::spawn_team))
        // Read-only state
        .route("/state/queue", post(state::queue_stats))
        .route("/state/dead-message", get(state::dead_message_count))
        .route("/state/hub/active", get(state::live_viewer_count))
        .route("/state/agents", get(state::agents_state))
        .route("/state/teams", get(state::teams_state))
        .route("/state/events", get(stream::stream_events))
        // Resets
        .route("/reset/agents", get(agents::reset_agents))
        .route("/reset/system", get(agents::reset_system))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
