//! CLI surface for the collector binary: parses flags with `clap`, then
//! layers them over [`collector_core::config::CollectorConfig`]'s
//! environment-sourced defaults. A flag always wins over its `COLLECTOR_*`
//! counterpart; anything left unset falls through to `CollectorConfig::from_env`.

use clap::Parser;

use collector_core::config::{CollectorConfig, ConfigError};

#[derive(Debug, Parser)]
#[command(name = "obs-collector", about = "Local runtime-observability collector")]
pub struct Cli {
    /// Bind host. Defaults to COLLECTOR_HOST, then 127.0.0.1.
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port. Defaults to COLLECTOR_PORT, then 7293.
    #[arg(long)]
    pub port: Option<u16>,

    /// How many successor ports to try if the requested one is taken.
    #[arg(long)]
    pub max_port_retries: Option<u16>,

    /// Per-event-type ring capacity.
    #[arg(long)]
    pub ring_capacity: Option<usize>,
}

impl Cli {
    /// Builds the effective [`CollectorConfig`]: CLI flags override
    /// environment variables, which override the built-in defaults.
    pub fn into_config(self) -> Result<CollectorConfig, ConfigError> {
        let mut config = CollectorConfig::from_env()?;
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_port_retries) = self.max_port_retries {
            config.max_port_retries = max_port_retries;
        }
        if let Some(ring_capacity) = self.ring_capacity {
            config.ring_capacity = ring_capacity;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_overrides_default_port() {
        let cli = Cli {
            host: None,
            port: Some(9999),
            max_port_retries: None,
            ring_capacity: None,
        };
        let config = cli.into_config().unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn unset_flags_fall_through_to_env_defaults() {
        let cli = Cli {
            host: None,
            port: None,
            max_port_retries: None,
            ring_capacity: None,
        };
        let config = cli.into_config().unwrap();
        assert_eq!(config, CollectorConfig::default());
    }
}
