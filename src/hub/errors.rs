use thiserror::Error;

/// Errors raised by the hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Broadcast contains reserved key: {0}")]
    ReservedKey(String),

    #[error("Hub is not running")]
    Closed,

    #[error("Failed to encode event: {0}")]
    Encoding(#[from] serde_json::Error),
}
