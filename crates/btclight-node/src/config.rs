//! Node configuration for the btclight daemon.
//!
//! [`NodeConfig`] is assembled in layers: built-in defaults, then an optional
//! TOML file, then `BTCLIGHT_*` environment variables. The binary applies
//! command-line flags on top and calls [`NodeConfig::validate`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use btclight_core::constants::{DEFAULT_RPC_PORT, MAX_FORK_AGE_DEFAULT, Network};

/// Environment variable prefix, e.g. `BTCLIGHT_RPC_PORT=9000`.
pub const ENV_PREFIX: &str = "BTCLIGHT";

#[derive(Error, Debug)]
pub enum NodeConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("max_fork_age must be positive")]
    InvalidMaxForkAge,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other} (expected text or json)")),
        }
    }
}

/// Configuration for a light client node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Bitcoin network to follow.
    pub network: Network,
    /// Root directory; each network gets its own subdirectory.
    pub data_dir: PathBuf,
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// Blocks the best fork must lead the checkpoint by before finalizing.
    pub max_fork_age: u64,
    /// Bootstrap JSON used to seed an empty database.
    pub bootstrap_path: Option<PathBuf>,
    /// Log level filter string (e.g. "info", "debug", "btclight_consensus=trace").
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".btclight");

        Self {
            network: Network::default(),
            data_dir,
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: DEFAULT_RPC_PORT,
            max_fork_age: MAX_FORK_AGE_DEFAULT,
            bootstrap_path: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl NodeConfig {
    /// Load defaults, then `file` (if given and present), then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, NodeConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);
        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Reject settings the light client cannot run with.
    pub fn validate(&self) -> Result<(), NodeConfigError> {
        if self.max_fork_age == 0 {
            return Err(NodeConfigError::InvalidMaxForkAge);
        }
        Ok(())
    }

    /// Directory for the configured network's data.
    pub fn network_dir(&self) -> PathBuf {
        self.data_dir.join(self.network.name())
    }

    /// Path to the RocksDB chain data directory.
    pub fn db_path(&self) -> PathBuf {
        self.network_dir().join("chaindata")
    }

    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(cfg.rpc_bind, "127.0.0.1");
        assert_eq!(cfg.max_fork_age, 8);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, LogFormat::Text);
        assert!(cfg.data_dir.ends_with(".btclight"));
    }

    #[test]
    fn rpc_addr_custom() {
        let cfg = NodeConfig {
            rpc_bind: "0.0.0.0".to_string(),
            rpc_port: 9999,
            ..NodeConfig::default()
        };
        assert_eq!(cfg.rpc_addr(), "0.0.0.0:9999");
    }

    #[test]
    fn db_path_is_per_network() {
        let cfg = NodeConfig {
            data_dir: PathBuf::from("/tmp/btclight-test"),
            network: Network::Testnet3,
            ..NodeConfig::default()
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/btclight-test/testnet3/chaindata"));
    }

    #[test]
    fn validate_rejects_zero_fork_age() {
        let cfg = NodeConfig { max_fork_age: 0, ..NodeConfig::default() };
        assert!(matches!(cfg.validate(), Err(NodeConfigError::InvalidMaxForkAge)));
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn load_without_file_gives_defaults() {
        let cfg = NodeConfig::load(None).unwrap();
        assert_eq!(cfg.max_fork_age, NodeConfig::default().max_fork_age);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "network = \"regressionnet\"\nrpc_port = 18443\nmax_fork_age = 3\nlog_format = \"json\""
        )
        .unwrap();

        let cfg = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.network, Network::Regressionnet);
        assert_eq!(cfg.rpc_port, 18443);
        assert_eq!(cfg.max_fork_age, 3);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.rpc_bind, "127.0.0.1");
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let cfg = NodeConfig::load(Some(Path::new("/nonexistent/btclight.toml"))).unwrap();
        assert_eq!(cfg.rpc_port, DEFAULT_RPC_PORT);
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn serde_round_trip() {
        let cfg = NodeConfig {
            bootstrap_path: Some(PathBuf::from("/etc/btclight/bootstrap.json")),
            ..NodeConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
