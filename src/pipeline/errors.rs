use thiserror::Error;

use crate::domain::messaging::BrokerError;

/// Errors raised while turning sightings into capture tasks
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Invalid sighting: {0}")]
    InvalidSighting(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors raised while setting up a team relay
#[derive(Debug, Error)]
pub enum TeamError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Invalid team: {0}")]
    InvalidTeam(String),
}

pub type TeamResult<T> = Result<T, TeamError>;
