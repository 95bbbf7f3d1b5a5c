use thiserror::Error;

/// Errors surfaced by a message broker
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unsupported broker url: {0}")]
    UnsupportedUrl(String),

    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Unknown delivery tag: {0}")]
    UnknownDeliveryTag(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrokerError {
    /// Whether trying the same operation again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::ConnectionFailed(_))
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
