//! Service composition
//!
//! Binds the leader with the ordered set of node agents into the single
//! service object handed to the hosting process. Building a service performs
//! no I/O.

use crate::error::Result;
use crate::keys;
use crate::leader::Leader;
use crate::models::{AgentStatus, ServiceKind};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// On-disk backend for OSD data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    #[default]
    Bluestore,
    Filestore,
}

/// OSD backend settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub store_type: StoreType,
    /// Write-ahead log size in MB, 0 for the backend default
    #[serde(default)]
    pub wal_size_mb: u32,
    /// Metadata database size in MB, 0 for the backend default
    #[serde(default)]
    pub database_size_mb: u32,
    /// Journal size in MB (filestore only), 0 for the backend default
    #[serde(default)]
    pub journal_size_mb: u32,
}

/// A node-local agent enacting one service's desired state
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable name used in status keys and logs
    fn name(&self) -> &'static str;

    /// Which service the agent manages
    fn kind(&self) -> ServiceKind;

    /// Root of the desired-state namespace the agent watches
    fn desired_root(&self) -> &'static str;

    /// Key the agent reports completion under for `node_id`
    fn status_key(&self, node_id: &str) -> String {
        keys::agent_status_key(node_id, self.kind())
    }

    /// Publish this agent's completion status for `node_id`
    async fn report_status(
        &self,
        store: &dyn KeyValueStore,
        node_id: &str,
        status: AgentStatus,
    ) -> Result<()> {
        store.set(&self.status_key(node_id), status.as_str()).await
    }
}

/// Monitor agent
#[derive(Debug, Clone, Default)]
pub struct MonitorAgent;

impl Agent for MonitorAgent {
    fn name(&self) -> &'static str {
        ServiceKind::Monitor.as_str()
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Monitor
    }

    fn desired_root(&self) -> &'static str {
        keys::MONITOR_DESIRED
    }
}

/// Manager daemon agent
#[derive(Debug, Clone, Default)]
pub struct ManagerAgent;

impl Agent for ManagerAgent {
    fn name(&self) -> &'static str {
        ServiceKind::Manager.as_str()
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Manager
    }

    fn desired_root(&self) -> &'static str {
        keys::MANAGER_DESIRED
    }
}

/// OSD agent and the node-local settings it provisions devices with
#[derive(Debug, Clone)]
pub struct OsdAgent {
    pub device_filter: String,
    pub metadata_device: String,
    pub data_dir: PathBuf,
    pub force_format: bool,
    pub location: String,
    pub store_config: StoreConfig,
    pub node_id: String,
}

impl Agent for OsdAgent {
    fn name(&self) -> &'static str {
        ServiceKind::Osd.as_str()
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Osd
    }

    fn desired_root(&self) -> &'static str {
        keys::OSD_DESIRED
    }
}

/// Metadata server agent
#[derive(Debug, Clone, Default)]
pub struct MdsAgent;

impl Agent for MdsAgent {
    fn name(&self) -> &'static str {
        ServiceKind::Mds.as_str()
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Mds
    }

    fn desired_root(&self) -> &'static str {
        keys::FS_DESIRED
    }
}

/// Object gateway agent
#[derive(Debug, Clone, Default)]
pub struct RgwAgent;

impl Agent for RgwAgent {
    fn name(&self) -> &'static str {
        ServiceKind::Rgw.as_str()
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Rgw
    }

    fn desired_root(&self) -> &'static str {
        keys::OBJECT_DESIRED
    }
}

/// Everything needed to build a [`Service`]
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    /// Device allowlist shared by the leader and the OSD agent
    pub device_filter: String,
    pub metadata_device: String,
    pub data_dir: PathBuf,
    pub force_format: bool,
    /// CRUSH location of this node's OSDs, e.g. `root=default`
    pub location: String,
    /// Admin secret to use if the cluster identity gets created
    pub admin_secret: Option<String>,
    pub store_config: StoreConfig,
    pub node_id: String,
    /// Monitor quorum size, `None` for the default
    pub monitor_count: Option<usize>,
}

/// The leader plus its agents, in startup order
pub struct Service {
    pub leader: Leader,
    pub agents: Vec<Box<dyn Agent>>,
}

impl Service {
    pub fn new(options: ServiceOptions) -> Self {
        let mut leader = Leader::new(&options.device_filter);
        if let Some(secret) = options.admin_secret.clone() {
            leader = leader.with_admin_secret(secret);
        }
        if let Some(count) = options.monitor_count {
            leader = leader.with_monitor_count(count);
        }

        let osd = OsdAgent {
            device_filter: options.device_filter,
            metadata_device: options.metadata_device,
            data_dir: options.data_dir,
            force_format: options.force_format,
            location: options.location,
            store_config: options.store_config,
            node_id: options.node_id,
        };

        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(MonitorAgent),
            Box::new(ManagerAgent),
            Box::new(osd),
            Box::new(MdsAgent),
            Box::new(RgwAgent),
        ];

        Self { leader, agents }
    }

    /// Agent names in startup order
    pub fn agent_names(&self) -> Vec<&'static str> {
        self.agents.iter().map(|a| a.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn options() -> ServiceOptions {
        ServiceOptions {
            device_filter: "a,b,c".to_string(),
            force_format: true,
            location: "root=default".to_string(),
            node_id: "mynode".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_service() {
        let service = Service::new(options());

        assert_eq!(
            service.leader.refresh_keys()[0].path,
            "/rook/services/ceph/osd/desired"
        );
        assert_eq!(service.agents.len(), 5);
        assert_eq!(service.agents[0].name(), "monitor");
        assert_eq!(service.agents[1].name(), "cephmgr");
        assert_eq!(service.agents[2].name(), "osd");
        assert_eq!(service.agents[3].name(), "mds");
        assert_eq!(service.agents[4].name(), "rgw");
    }

    #[test]
    fn test_leader_gets_device_filter() {
        let service = Service::new(options());
        let filter = service.leader.device_filter();
        assert!(filter.admits("b"));
        assert!(!filter.admits("d"));
    }

    #[test]
    fn test_agent_desired_roots() {
        let service = Service::new(options());
        let roots: Vec<_> = service.agents.iter().map(|a| a.desired_root()).collect();
        assert_eq!(
            roots,
            vec![
                "/rook/services/ceph/monitor/desired",
                "/rook/services/ceph/mgr/desired",
                "/rook/services/ceph/osd/desired",
                "/rook/services/ceph/fs/desired",
                "/rook/services/ceph/object/desired",
            ]
        );
    }

    #[tokio::test]
    async fn test_agent_report_status() {
        let service = Service::new(options());
        let store = MemoryStore::new();

        service.agents[2]
            .report_status(&store, "mynode", AgentStatus::Succeeded)
            .await
            .unwrap();

        assert_eq!(
            store.value("/rook/_notify/mynode/osd/status").as_deref(),
            Some("succeeded")
        );
    }
}
