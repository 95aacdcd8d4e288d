//! Leader configuration

use anyhow::{Context as _, Result};
use leader_lib::{NodeConfig, ServiceOptions, StoreConfig, StoreType, TopologySnapshot};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "CEPH_LEADER_CONFIG";

/// A node of the static inventory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeEntry {
    pub id: String,
    pub public_ip: String,
    #[serde(default)]
    pub devices: Vec<String>,
}

/// Leader configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaderConfig {
    /// Node this process runs on
    pub node_id: String,

    /// API server port for health/metrics
    pub api_port: u16,

    /// Periodic refresh interval in seconds
    pub refresh_interval_secs: u64,

    /// Comma-separated device allowlist, empty or `all` for every device
    pub device_filter: String,
    pub metadata_device: String,
    pub data_dir: PathBuf,
    pub force_format: bool,
    pub location: String,

    /// Admin secret to use when the cluster identity is first created
    pub admin_secret: Option<String>,

    /// Monitor quorum size
    pub monitor_count: usize,

    pub store_type: StoreType,
    pub wal_size_mb: u32,
    pub database_size_mb: u32,
    pub journal_size_mb: u32,

    /// Static node inventory
    pub nodes: Vec<NodeEntry>,
}

fn default_node_id() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "localhost".to_string())
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api_port: 8080,
            refresh_interval_secs: 60,
            device_filter: String::new(),
            metadata_device: String::new(),
            data_dir: PathBuf::from("/var/lib/rook"),
            force_format: false,
            location: String::new(),
            admin_secret: None,
            monitor_count: 3,
            store_type: StoreType::Bluestore,
            wal_size_mb: 0,
            database_size_mb: 0,
            journal_size_mb: 0,
            nodes: Vec::new(),
        }
    }
}

impl LeaderConfig {
    /// Load configuration from the file named by `CEPH_LEADER_CONFIG` (if
    /// any) and `LEADER_*` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("LEADER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to read leader configuration")?;

        config
            .try_deserialize()
            .context("Invalid leader configuration")
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            store_type: self.store_type,
            wal_size_mb: self.wal_size_mb,
            database_size_mb: self.database_size_mb,
            journal_size_mb: self.journal_size_mb,
        }
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            device_filter: self.device_filter.clone(),
            metadata_device: self.metadata_device.clone(),
            data_dir: self.data_dir.clone(),
            force_format: self.force_format,
            location: self.location.clone(),
            admin_secret: self.admin_secret.clone(),
            store_config: self.store_config(),
            node_id: self.node_id.clone(),
            monitor_count: Some(self.monitor_count),
        }
    }

    /// Initial topology for the static inventory
    pub fn topology(&self) -> TopologySnapshot {
        self.nodes.iter().fold(TopologySnapshot::new(), |topology, node| {
            topology.with_node(
                node.id.clone(),
                NodeConfig::new(node.public_ip.clone()).with_devices(node.devices.iter().cloned()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LeaderConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/rook"));
        assert_eq!(config.monitor_count, 3);
        assert_eq!(config.store_type, StoreType::Bluestore);
        assert!(config.admin_secret.is_none());
        assert!(config.topology().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
node_id = "node1"
refresh_interval_secs = 5
device_filter = "sda,sdb"
admin_secret = "adminsecret"
monitor_count = 1
store_type = "filestore"
journal_size_mb = 1024

[[nodes]]
id = "node1"
public_ip = "10.0.0.1"
devices = ["sda", "sdb", "sdc"]

[[nodes]]
id = "node2"
public_ip = "10.0.0.2"
"#
        )
        .unwrap();

        let config = LeaderConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.node_id, "node1");
        assert_eq!(config.refresh_interval(), Duration::from_secs(5));
        assert_eq!(config.admin_secret.as_deref(), Some("adminsecret"));
        assert_eq!(config.store_config().store_type, StoreType::Filestore);
        assert_eq!(config.store_config().journal_size_mb, 1024);

        let topology = config.topology();
        assert_eq!(topology.len(), 2);
        assert_eq!(topology.get("node1").unwrap().devices.len(), 3);
        assert_eq!(topology.get("node2").unwrap().public_ip, "10.0.0.2");

        let options = config.service_options();
        assert_eq!(options.monitor_count, Some(1));
        assert_eq!(options.device_filter, "sda,sdb");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "api_port = \"not a port\"").unwrap();
        assert!(LeaderConfig::load_from(Some(file.path())).is_err());
    }
}
