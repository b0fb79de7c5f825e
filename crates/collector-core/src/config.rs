//! Collector configuration, loaded from the environment with
//! `127.0.0.1`-only defaults; refusing non-loopback connections is
//! the default stance.

use std::env;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}: {source}")]
    Parse { key: String, source: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub host: String,
    pub port: u16,
    pub max_port_retries: u16,
    pub ring_capacity: usize,
    pub command_timeout_ms: u64,
    pub session_buffer_cap: usize,
    pub outbound_queue_cap: usize,
    pub broadcast_queue_cap: usize,
    pub shutdown_grace_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7293,
            max_port_retries: 10,
            ring_capacity: 10_000,
            command_timeout_ms: 10_000,
            session_buffer_cap: 64,
            outbound_queue_cap: 256,
            broadcast_queue_cap: 1_024,
            shutdown_grace_ms: 2_000,
        }
    }
}

impl CollectorConfig {
    /// Reads `COLLECTOR_*` variables, falling back to the loopback
    /// defaults in [`Default`] for anything unset.
    pub fn from_env() -> ConfigResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env::var("COLLECTOR_HOST").unwrap_or(defaults.host),
            port: parse_or_default("COLLECTOR_PORT", defaults.port)?,
            max_port_retries: parse_or_default("COLLECTOR_MAX_PORT_RETRIES", defaults.max_port_retries)?,
            ring_capacity: parse_or_default("COLLECTOR_RING_CAPACITY", defaults.ring_capacity)?,
            command_timeout_ms: parse_or_default("COLLECTOR_COMMAND_TIMEOUT_MS", defaults.command_timeout_ms)?,
            session_buffer_cap: parse_or_default("COLLECTOR_SESSION_BUFFER_CAP", defaults.session_buffer_cap)?,
            outbound_queue_cap: parse_or_default("COLLECTOR_OUTBOUND_QUEUE_CAP", defaults.outbound_queue_cap)?,
            broadcast_queue_cap: parse_or_default("COLLECTOR_BROADCAST_QUEUE_CAP", defaults.broadcast_queue_cap)?,
            shutdown_grace_ms: parse_or_default("COLLECTOR_SHUTDOWN_GRACE_MS", defaults.shutdown_grace_ms)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value.parse().map_err(|e: T::Err| ConfigError::Parse {
            key: key.to_string(),
            source: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_loopback() {
        let config = CollectorConfig::default();
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn parse_or_default_falls_back_when_unset() {
        env::remove_var("COLLECTOR_TEST_UNSET_KEY");
        let value: u16 = parse_or_default("COLLECTOR_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn parse_or_default_rejects_unparseable_value() {
        env::set_var("COLLECTOR_TEST_BAD_PORT", "not-a-number");
        let result: ConfigResult<u16> = parse_or_default("COLLECTOR_TEST_BAD_PORT", 1);
        assert!(result.is_err());
        env::remove_var("COLLECTOR_TEST_BAD_PORT");
    }
}
