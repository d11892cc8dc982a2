//! Configuration management for a Cairn node
//!
//! Supports loading from TOML files and environment variables.

use crate::scheme::StorageScheme;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Complete node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node identity configuration
    #[serde(default)]
    pub node: NodeIdentity,

    /// Storage scheme selection
    #[serde(default)]
    pub scheme: SchemeConfig,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkSettings,
}

impl NodeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "node name cannot be empty".to_string(),
            ));
        }

        self.scheme.validate()?;

        let mut ids: Vec<&str> = self.network.peers.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::ValidationError(format!(
                "peer id {} listed twice",
                pair[0]
            )));
        }

        if self.network.rpc_timeout_ms == 0 || self.network.ping_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(
        mut self,
        node_name: Option<String>,
        data_dir: Option<PathBuf>,
        scheme: Option<SchemeKind>,
    ) -> Self {
        if let Some(name) = node_name {
            self.node.name = name;
        }
        if let Some(dir) = data_dir {
            self.node.data_dir = dir;
        }
        if let Some(kind) = scheme {
            self.scheme.kind = kind;
        }
        self
    }

    /// Apply environment variable overrides to all settings
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var("CAIRN_NODE_NAME") {
            self.node.name = name;
        }

        if let Ok(dir) = std::env::var("CAIRN_DATA_DIR") {
            self.node.data_dir = PathBuf::from(dir);
        }

        if let Ok(scheme) = std::env::var("CAIRN_SCHEME") {
            match scheme.parse() {
                Ok(kind) => self.scheme.kind = kind,
                Err(e) => tracing::warn!(error = %e, "Ignoring CAIRN_SCHEME"),
            }
        }

        self
    }
}

/// Node identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// This node's peer id; never offered as a host for its own stores
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Directory for registry and simulated peer data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for NodeIdentity {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_node_name() -> String {
    "cairn-node".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./cairn_data")
}

/// Storage scheme kinds, as named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    Hosting,
    Naive,
    Shard,
    Parity,
    Shardshard,
    Reedsolomon,
}

impl std::str::FromStr for SchemeKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hosting" => Ok(Self::Hosting),
            "naive" => Ok(Self::Naive),
            "shard" => Ok(Self::Shard),
            "parity" => Ok(Self::Parity),
            "shardshard" => Ok(Self::Shardshard),
            "reedsolomon" => Ok(Self::Reedsolomon),
            other => Err(ConfigError::ValidationError(format!(
                "unknown scheme {:?}",
                other
            ))),
        }
    }
}

/// Scheme selection and parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeConfig {
    /// Which scheme stores and retrieves files
    #[serde(default = "default_scheme_kind")]
    pub kind: SchemeKind,

    /// Number of peers to stripe over
    #[serde(default = "default_peers")]
    pub n: usize,

    /// Number of shards per block
    #[serde(default = "default_shards")]
    pub k: usize,

    /// Copies per shard (`shardshard`) or minimum shard count (`reedsolomon`)
    #[serde(default = "default_redundancy")]
    pub m: usize,

    /// Seed for peer choice and shard sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            kind: default_scheme_kind(),
            n: default_peers(),
            k: default_shards(),
            m: default_redundancy(),
            seed: None,
        }
    }
}

impl SchemeConfig {
    /// Build the configured scheme
    pub fn to_scheme(&self) -> StorageScheme {
        let (n, k, m) = (self.n, self.k, self.m);
        match self.kind {
            SchemeKind::Hosting => StorageScheme::Hosting,
            SchemeKind::Naive => StorageScheme::NaiveDuplication { n },
            SchemeKind::Shard => StorageScheme::VanillaSharding { n, k },
            SchemeKind::Parity => StorageScheme::ParitySharding { n, k },
            SchemeKind::Shardshard => StorageScheme::RedundantSharding { n, k, m },
            SchemeKind::Reedsolomon => StorageScheme::ReedSolomon { n, k, j: m },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_scheme()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn default_scheme_kind() -> SchemeKind {
    SchemeKind::Hosting
}

fn default_peers() -> usize {
    3
}

fn default_shards() -> usize {
    3
}

fn default_redundancy() -> usize {
    2
}

/// A storage peer known to this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub id: String,
    pub address: String,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Timeout for each block transfer in milliseconds
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// Timeout for each liveness ping in milliseconds
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,

    /// Known storage peers
    #[serde(default = "default_peer_entries")]
    pub peers: Vec<PeerEntry>,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: default_rpc_timeout(),
            ping_timeout_ms: default_ping_timeout(),
            peers: default_peer_entries(),
        }
    }
}

impl NetworkSettings {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}

fn default_peer_entries() -> Vec<PeerEntry> {
    (1..=4)
        .map(|i| PeerEntry {
            id: format!("peer-{}", i),
            address: format!("local://peer-{}", i),
        })
        .collect()
}

fn default_rpc_timeout() -> u64 {
    5000
}

fn default_ping_timeout() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.node.name, "cairn-node");
        assert_eq!(config.scheme.kind, SchemeKind::Hosting);
        assert_eq!(config.network.peers.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            [node]
            name = "node-a"

            [scheme]
            kind = "reedsolomon"
            n = 5
            k = 5
            m = 3
            seed = 7

            [network]
            rpc_timeout_ms = 250
            peers = [
                { id = "p1", address = "10.0.0.1:7000" },
                { id = "p2", address = "10.0.0.2:7000" },
            ]
        "#;

        let config: NodeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.node.name, "node-a");
        assert_eq!(config.node.data_dir, PathBuf::from("./cairn_data"));
        assert_eq!(
            config.scheme.to_scheme(),
            StorageScheme::ReedSolomon { n: 5, k: 5, j: 3 }
        );
        assert_eq!(config.scheme.seed, Some(7));
        assert_eq!(config.network.peers[1].address, "10.0.0.2:7000");
        assert_eq!(config.network.rpc_timeout(), Duration::from_millis(250));
        assert_eq!(config.network.ping_timeout_ms, 1000);
    }

    #[test]
    fn test_scheme_validation() {
        let mut scheme = SchemeConfig {
            kind: SchemeKind::Shard,
            k: 0,
            ..Default::default()
        };
        assert!(scheme.validate().is_err());

        scheme.kind = SchemeKind::Reedsolomon;
        scheme.k = 4;
        scheme.m = 4;
        assert!(scheme.validate().is_err());

        scheme.m = 0;
        assert!(scheme.validate().is_err());

        scheme.m = 2;
        assert!(scheme.validate().is_ok());

        scheme.k = 300;
        assert!(scheme.validate().is_err());
    }

    #[test]
    fn test_duplicate_peer_rejected() {
        let mut config = NodeConfig::default();
        config.network.peers.push(config.network.peers[0].clone());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = NodeConfig::default();
        config.scheme.kind = SchemeKind::Parity;
        std::fs::write(&path, toml::to_string(&config).unwrap()).unwrap();

        let loaded = NodeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.scheme.kind, SchemeKind::Parity);
        assert_eq!(loaded.network.peers, config.network.peers);

        let fallback = NodeConfig::load_or_default(dir.path().join("missing.toml"));
        assert_eq!(fallback.scheme.kind, SchemeKind::Hosting);
    }

    #[test]
    fn test_config_overrides() {
        let config = NodeConfig::default().with_overrides(
            Some("node-b".to_string()),
            Some(PathBuf::from("/custom/path")),
            Some(SchemeKind::Naive),
        );

        assert_eq!(config.node.name, "node-b");
        assert_eq!(config.node.data_dir, PathBuf::from("/custom/path"));
        assert_eq!(config.scheme.kind, SchemeKind::Naive);
    }

    #[test]
    fn test_scheme_kind_parse() {
        assert_eq!("ShardShard".parse::<SchemeKind>().unwrap(), SchemeKind::Shardshard);
        assert!("raid5".parse::<SchemeKind>().is_err());
    }
}
