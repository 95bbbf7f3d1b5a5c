use thiserror::Error;

use crate::domain::messaging::BrokerError;

/// Errors that can occur in the agent system
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(u32),

    #[error("Agent not found: {0}")]
    AgentNotFound(u32),

    #[error("Invalid agent: {0}")]
    InvalidAgent(String),

    #[error("Agent {0} is already listening")]
    AlreadyListening(u32),
}

pub type AgentResult<T> = Result<T, AgentError>;
