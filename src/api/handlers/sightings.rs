use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::Serialize;

use crate::api::errors::ApiError;
use crate::api::state::AppState;
use crate::domain::messaging::topology::SIGHTING_EXCHANGE;
use crate::domain::messaging::OutboundMessage;
use crate::domain::sighting::SightingMessage;
use crate::domain::task::DEADLINE_RANGE;
use crate::hub::{Broadcaster, Fields};

/// Event type of producer-side announcements
pub const SYSTEM_LOG: &str = "system log";

/// Response from a submitted sighting
#[derive(Debug, Serialize)]
pub struct SightingResponse {
    #[serde(flatten)]
    pub sighting: SightingMessage,
    pub message: String,
}

/// Publish a sighting on its category topic
///
/// POST /sighting
pub async fn submit_sighting(
    State(state): State<AppState>,
    payload: Result<Json<SightingMessage>, JsonRejection>,
) -> Result<Json<SightingResponse>, ApiError> {
    let Json(mut message) = payload?;
    message.sighting.validate().map_err(ApiError::bad_request)?;

    let capture_time = match message.capture_time {
        Some(seconds) if seconds > 0 => seconds,
        _ => state.chance.pick(DEADLINE_RANGE),
    };
    message.capture_time = Some(capture_time);

    let sighting = &message.sighting;
    state
        .hub
        .broadcast(
            &format!(
                "Spawned {} pokemon: {} at {} with capture time {}",
                sighting.category, sighting.pokemon, sighting.location, capture_time
            ),
            SYSTEM_LOG,
            true,
            Fields::new(),
        )
        .await;

    let outbound = OutboundMessage::json(&message)?;
    state
        .broker
        .publish(SIGHTING_EXCHANGE, &sighting.topic(), outbound)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to publish sighting");
            ApiError::internal_server_error("failed to publish sighting")
        })?;

    tracing::info!(pokemon = %sighting.pokemon, category = %sighting.category, capture_time, "sighting published");
    Ok(Json(SightingResponse {
        sighting: message,
        message: "Successfully submitted Pokemon sighting".to_string(),
    }))
}
