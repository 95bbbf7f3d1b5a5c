use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{AmqpBroker, InMemoryBroker};
use crate::domain::messaging::{BrokerError, BrokerResult, MessageBroker};

/// Retry schedule for the initial broker connection
///
/// After the n-th failure the caller waits `n² × base`. Once more than
/// `max_attempts` attempts have failed the last error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
}

impl RetryPolicy {
    /// Delay after `failures` failed attempts
    pub fn backoff(&self, failures: u32) -> Duration {
        self.base.saturating_mul(failures.saturating_mul(failures))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(1),
        }
    }
}

/// Runs `connect` until it succeeds or the policy gives up
pub async fn connect_with_retry<T, F, Fut>(policy: RetryPolicy, mut connect: F) -> BrokerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BrokerResult<T>>,
{
    let mut failures: u32 = 0;
    loop {
        match connect().await {
            Ok(connection) => {
                if failures > 0 {
                    tracing::info!(failures, "broker connection established after retries");
                }
                return Ok(connection);
            }
            Err(e) if !e.is_retryable() => {
                tracing::error!(error = %e, "broker connection cannot succeed, not retrying");
                return Err(e);
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(attempt = failures, error = %e, "broker not yet ready");
                if failures > policy.max_attempts {
                    tracing::error!(attempts = failures, "giving up on broker connection");
                    return Err(e);
                }
            }
        }

        let delay = policy.backoff(failures);
        tracing::info!(delay_ms = delay.as_millis() as u64, "backing off");
        tokio::time::sleep(delay).await;
    }
}

/// Opens the adapter matching the scheme of `url`, retrying per `policy`
///
/// `amqp://` and `amqps://` connect to a broker server; `memory://` runs
/// the in-process broker.
pub async fn connect_broker(url: &str, policy: RetryPolicy) -> BrokerResult<Arc<dyn MessageBroker>> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme);
    match scheme {
        Some("amqp") | Some("amqps") => {
            let broker = connect_with_retry(policy, || AmqpBroker::connect(url)).await?;
            Ok(Arc::new(broker))
        }
        Some("memory") => {
            let broker = connect_with_retry(policy, || InMemoryBroker::connect(url)).await?;
            Ok(Arc::new(broker))
        }
        _ => Err(BrokerError::UnsupportedUrl(url.to_string())),
    }
}
