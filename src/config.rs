use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::agents::AgentSettings;
use crate::hub::ViewerSettings;
use crate::infrastructure::broker::RetryPolicy;
use crate::pipeline::DispatcherSettings;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0}")]
    Inconsistent(String),
}

/// Runtime configuration, read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub broker_url: String,
    pub retry: RetryPolicy,
    pub hub_command_capacity: usize,
    pub viewer: ViewerSettings,
    pub dispatcher: DispatcherSettings,
    pub agents: AgentSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            broker_url: "memory://local".to_string(),
            retry: RetryPolicy::default(),
            hub_command_capacity: 256,
            viewer: ViewerSettings::default(),
            dispatcher: DispatcherSettings::default(),
            agents: AgentSettings::default(),
        }
    }
}

impl AppConfig {
    /// Reads the process environment; call `dotenv` first to honour `.env`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let delivery_limit = match get("TASK_DELIVERY_LIMIT") {
            Some(value) => Some(parse("TASK_DELIVERY_LIMIT", &value)?),
            None => None,
        };

        let topics = match get("SIGHTING_TOPICS") {
            Some(value) => value
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            None => defaults.dispatcher.topics.clone(),
        };

        let config = Self {
            port: parse_or(&get, "PORT", defaults.port)?,
            broker_url: get("BROKER_URL").unwrap_or(defaults.broker_url),
            retry: RetryPolicy {
                max_attempts: parse_or(&get, "CONNECT_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                base: millis_or(&get, "CONNECT_BACKOFF_MS", defaults.retry.base)?,
            },
            hub_command_capacity: parse_or(&get, "HUB_COMMAND_CAPACITY", defaults.hub_command_capacity)?,
            viewer: ViewerSettings {
                mailbox_capacity: parse_or(
                    &get,
                    "VIEWER_MAILBOX_CAPACITY",
                    defaults.viewer.mailbox_capacity,
                )?,
                probe_interval: secs_or(&get, "PROBE_INTERVAL_SECS", defaults.viewer.probe_interval)?,
                liveness_timeout: secs_or(
                    &get,
                    "LIVENESS_TIMEOUT_SECS",
                    defaults.viewer.liveness_timeout,
                )?,
            },
            dispatcher: DispatcherSettings {
                name: get("DISPATCHER_NAME").unwrap_or(defaults.dispatcher.name),
                topics,
                delay: millis_or(&get, "DISPATCH_DELAY_MS", defaults.dispatcher.delay)?,
                delivery_limit,
            },
            agents: AgentSettings {
                work_unit: millis_or(&get, "WORK_UNIT_MS", defaults.agents.work_unit)?,
                failure_odds: parse_or(&get, "FAILURE_ODDS", defaults.agents.failure_odds)?,
                drain_timeout: secs_or(&get, "DRAIN_TIMEOUT_SECS", defaults.agents.drain_timeout)?,
                delivery_limit,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.viewer.probe_interval.is_zero() {
            return Err(ConfigError::Inconsistent(
                "PROBE_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        if self.viewer.liveness_timeout <= self.viewer.probe_interval {
            return Err(ConfigError::Inconsistent(
                "LIVENESS_TIMEOUT_SECS must exceed PROBE_INTERVAL_SECS".to_string(),
            ));
        }
        if self.dispatcher.topics.is_empty() {
            return Err(ConfigError::Inconsistent(
                "SIGHTING_TOPICS needs at least one topic".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse(key, &value),
        None => Ok(default),
    }
}

fn millis_or<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse(key, &value).map(Duration::from_millis),
        None => Ok(default),
    }
}

fn secs_or<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => parse(key, &value).map(Duration::from_secs),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(config(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("SIGHTING_TOPICS", "pokemon.sighting.fire, pokemon.sighting.water"),
            ("WORK_UNIT_MS", "10"),
            ("TASK_DELIVERY_LIMIT", "3"),
            ("DISPATCHER_NAME", "HQ"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.dispatcher.topics,
            ["pokemon.sighting.fire", "pokemon.sighting.water"]
        );
        assert_eq!(config.agents.work_unit, Duration::from_millis(10));
        assert_eq!(config.agents.delivery_limit, Some(3));
        assert_eq!(config.dispatcher.delivery_limit, Some(3));
        assert_eq!(config.dispatcher.name, "HQ");
    }

    #[test]
    fn invalid_number_is_reported() {
        assert_eq!(
            config(&[("FAILURE_ODDS", "often")]),
            Err(ConfigError::InvalidValue {
                key: "FAILURE_ODDS",
                value: "often".to_string()
            })
        );
    }

    #[test]
    fn liveness_timeout_must_exceed_probe_interval() {
        let result = config(&[("PROBE_INTERVAL_SECS", "10"), ("LIVENESS_TIMEOUT_SECS", "10")]);

        assert!(matches!(result, Err(ConfigError::Inconsistent(_))));
    }
}
