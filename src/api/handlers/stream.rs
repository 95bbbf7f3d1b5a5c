use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
};
use futures::StreamExt;

use crate::api::state::AppState;
use crate::hub::run_viewer;

/// Largest frame a viewer may send; viewers only answer pings
pub const MAX_VIEWER_FRAME: usize = 512;

/// Upgrade to a WebSocket that receives every hub event
///
/// GET /state/events
pub async fn stream_events(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let hub = state.hub.clone();
    let settings = state.viewer;
    ws.max_message_size(MAX_VIEWER_FRAME)
        .max_frame_size(MAX_VIEWER_FRAME)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            run_viewer(hub, settings, sink, stream).await;
        })
}
