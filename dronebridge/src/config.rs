use crate::error::{BridgeError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Which wire protocol the TAK sink uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TakProtocol {
    Tcp,
    Udp,
}

fn default_rate_limit() -> f64 {
    1.0
}

fn default_keepalive_interval() -> f64 {
    10.0
}

fn default_max_drones() -> usize {
    30
}

fn default_inactivity_timeout() -> f64 {
    60.0
}

fn default_position_threshold() -> f64 {
    2e-5
}

fn default_min_consecutive_for_unique() -> u32 {
    2
}

fn default_multicast_ttl() -> u32 {
    1
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_backoff_cap() -> f64 {
    60.0
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

/// The recognized configuration surface, loaded from a YAML file.
///
/// Argument and configuration-file *parsing* (argv handling, merging CLI
/// flags over a file) are handled by the caller — this type only owns
/// deserialization of an already-located YAML document.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub subscribe_host: String,
    pub telemetry_port: u16,
    #[serde(default)]
    pub status_port: Option<u16>,

    #[serde(default)]
    pub tak_host: Option<String>,
    #[serde(default)]
    pub tak_port: Option<u16>,
    #[serde(default)]
    pub tak_protocol: Option<TakProtocol>,

    #[serde(default)]
    pub tls_cert_chain: Option<String>,
    #[serde(default)]
    pub tls_private_key: Option<String>,
    #[serde(default)]
    pub tls_ca_chain: Option<String>,
    #[serde(default)]
    pub tls_skip_verify: bool,

    #[serde(default)]
    pub multicast_enabled: bool,
    #[serde(default)]
    pub multicast_address: Option<String>,
    #[serde(default)]
    pub multicast_port: Option<u16>,
    #[serde(default)]
    pub multicast_interface: Option<String>,
    #[serde(default = "default_multicast_ttl")]
    pub multicast_ttl: u32,

    #[serde(default = "default_rate_limit")]
    pub rate_limit: f64,
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: f64,
    #[serde(default = "default_max_drones")]
    pub max_drones: usize,
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout: f64,
    #[serde(default = "default_position_threshold")]
    pub position_threshold: f64,
    #[serde(default = "default_min_consecutive_for_unique")]
    pub min_consecutive_for_unique: u32,

    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap: f64,
    #[serde(default)]
    pub retry_limit: Option<u32>,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,

    #[serde(default)]
    pub debug: bool,
}

impl Config {
    /// Loads and validates a config from a YAML file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: Config = serde_yaml::from_str(&raw)
            .map_err(|e| BridgeError::ConfigError(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from the path named by `DRONEBRIDGE_CONFIG`, or `config.yaml` in
    /// the working directory if unset.
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var("DRONEBRIDGE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
        Self::from_file(path)
    }

    fn validate(&self) -> Result<()> {
        if self.subscribe_host.is_empty() {
            return Err(BridgeError::ConfigError(
                "subscribe_host must not be empty".into(),
            ));
        }
        if self.tak_host.is_some() != self.tak_port.is_some() {
            return Err(BridgeError::ConfigError(
                "tak_host and tak_port must be set together".into(),
            ));
        }
        if self.tak_protocol == Some(TakProtocol::Tcp)
            && self.tls_cert_chain.is_some() != self.tls_private_key.is_some()
        {
            return Err(BridgeError::ConfigError(
                "tls_cert_chain and tls_private_key must be set together".into(),
            ));
        }
        if self.multicast_enabled && (self.multicast_address.is_none() || self.multicast_port.is_none())
        {
            return Err(BridgeError::ConfigError(
                "multicast_enabled requires multicast_address and multicast_port".into(),
            ));
        }
        Ok(())
    }

    pub fn rate_limit_duration(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit)
    }

    pub fn keepalive_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.keepalive_interval)
    }

    pub fn inactivity_timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.inactivity_timeout)
    }

    pub fn retry_delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay)
    }

    pub fn backoff_cap_duration(&self) -> Duration {
        Duration::from_secs_f64(self.backoff_cap)
    }
}
