use std::sync::Arc;

use crate::agents::{AgentRegistry, Chance};
use crate::domain::messaging::MessageBroker;
use crate::hub::{HubHandle, ViewerSettings};
use crate::pipeline::{DeadLetterMonitor, TeamRoster};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<dyn MessageBroker>,
    pub hub: HubHandle,
    pub chance: Arc<dyn Chance>,
    pub agents: Arc<AgentRegistry>,
    pub teams: Arc<TeamRoster>,
    pub dead_letters: Arc<DeadLetterMonitor>,
    pub viewer: ViewerSettings,
}
