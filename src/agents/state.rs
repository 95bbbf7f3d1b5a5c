use serde::{Deserialize, Serialize};

/// Lifecycle of a rocket agent
///
/// # Transitions
/// ```text
/// Created -> Listening <-> Processing
///    |           |             |
///    +--------> Stopping <-----+ -> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    /// Declared its subscription, not consuming yet
    Created,
    /// Waiting for the next capture task
    Listening,
    /// Working on exactly one capture task
    Processing,
    /// Draining after a stop request
    Stopping,
    /// Subscription released
    Stopped,
}

impl AgentState {
    /// Checks if a transition from current state to next state is valid
    ///
    /// # Example
    /// ```
    /// use pokemon_tracker_api::agents::state::AgentState;
    ///
    /// assert!(AgentState::Listening.can_transition_to(AgentState::Processing));
    /// assert!(!AgentState::Stopped.can_transition_to(AgentState::Listening));
    /// ```
    pub fn can_transition_to(&self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Created, Listening)
                | (Created, Stopping)
                | (Listening, Processing)
                | (Processing, Listening)
                | (Listening, Stopping)
                | (Processing, Stopping)
                | (Stopping, Stopped)
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Created => write!(f, "created"),
            AgentState::Listening => write!(f, "listening"),
            AgentState::Processing => write!(f, "processing"),
            AgentState::Stopping => write!(f, "stopping"),
            AgentState::Stopped => write!(f, "stopped"),
        }
    }
}
