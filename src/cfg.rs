use serde::Deserialize;
use thiserror::Error;

use crate::proto::FarcasterNetwork;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

fn default_rocksdb_dir() -> String {
    ".rocks".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_network_id() -> u32 {
    FarcasterNetwork::Devnet as u32
}

fn default_validation_workers() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsdConfig {
    #[serde(default)]
    pub addr: String,
    #[serde(default = "default_statsd_prefix")]
    pub prefix: String,
}

fn default_statsd_prefix() -> String {
    "hubd".to_string()
}

impl Default for StatsdConfig {
    fn default() -> Self {
        StatsdConfig {
            addr: String::new(),
            prefix: default_statsd_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_rocksdb_dir")]
    pub rocksdb_dir: String,

    #[serde(default)]
    pub clear_db: bool,

    /// Numeric network id; see `FarcasterNetwork`.
    #[serde(default = "default_network_id")]
    pub fc_network_id: u32,

    /// "text" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default)]
    pub statsd: StatsdConfig,

    #[serde(default)]
    pub eth_mainnet_rpc_url: String,

    #[serde(default)]
    pub eth_rpc_url: String,

    #[serde(default = "default_validation_workers")]
    pub validation_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rocksdb_dir: default_rocksdb_dir(),
            clear_db: false,
            fc_network_id: default_network_id(),
            log_format: default_log_format(),
            statsd: StatsdConfig::default(),
            eth_mainnet_rpc_url: String::new(),
            eth_rpc_url: String::new(),
            validation_workers: default_validation_workers(),
        }
    }
}

impl Config {
    pub fn fc_network(&self) -> Result<FarcasterNetwork, ConfigError> {
        FarcasterNetwork::try_from(self.fc_network_id as i32)
            .ok()
            .filter(|n| *n != FarcasterNetwork::None)
            .ok_or_else(|| {
                ConfigError::Invalid(format!("unknown network id {}", self.fc_network_id))
            })
    }
}

/// Layering: config-file values, overridden by well-known environment
/// variables. CLI flags are applied by the caller on top.
pub fn load_and_merge_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        }
        None => Config::default(),
    };

    if let Ok(network_id) = std::env::var("FC_NETWORK_ID") {
        config.fc_network_id = network_id
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("bad FC_NETWORK_ID: {}", network_id)))?;
    }
    if let Ok(url) = std::env::var("ETH_MAINNET_RPC_URL") {
        config.eth_mainnet_rpc_url = url;
    }
    if let Ok(url) = std::env::var("ETH_RPC_URL") {
        config.eth_rpc_url = url;
    }
    if let Ok(addr) = std::env::var("STATSD_METRICS_SERVER") {
        config.statsd.addr = addr;
    }

    // Fail fast on a bad network id
    config.fc_network()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.rocksdb_dir, ".rocks");
        assert_eq!(config.log_format, "text");
        assert_eq!(config.fc_network().unwrap(), FarcasterNetwork::Devnet);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            rocksdb_dir = "/var/hubd"
            fc_network_id = 1
            log_format = "json"

            [statsd]
            addr = "127.0.0.1:8125"
            "#,
        )
        .unwrap();
        assert_eq!(config.rocksdb_dir, "/var/hubd");
        assert_eq!(config.fc_network().unwrap(), FarcasterNetwork::Mainnet);
        assert_eq!(config.statsd.addr, "127.0.0.1:8125");
        assert_eq!(config.statsd.prefix, "hubd");
    }

    #[test]
    fn test_rejects_unknown_network() {
        let config = Config {
            fc_network_id: 99,
            ..Config::default()
        };
        assert!(config.fc_network().is_err());
    }
}
