//! Core data models for the leader engine

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Name persisted alongside every cluster identity
pub const CLUSTER_NAME: &str = "rookcluster";

/// Port every monitor listens on
pub const MONITOR_PORT: u16 = 6790;

/// Permanent identity of the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub fsid: String,
    pub monitor_secret: String,
    pub admin_secret: String,
    pub name: String,
}

/// Inventory entry for a single node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub public_ip: String,
    #[serde(default)]
    pub devices: Vec<String>,
}

impl NodeConfig {
    pub fn new(public_ip: impl Into<String>) -> Self {
        Self {
            public_ip: public_ip.into(),
            devices: Vec::new(),
        }
    }

    pub fn with_devices<I, S>(mut self, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.devices = devices.into_iter().map(Into::into).collect();
        self
    }
}

/// Known node set at the time of a refresh.
///
/// Nodes are kept in a `BTreeMap` so every walk over the snapshot visits node
/// ids in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    nodes: BTreeMap<String, NodeConfig>,
}

impl TopologySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node
    pub fn insert(&mut self, node_id: impl Into<String>, config: NodeConfig) {
        self.nodes.insert(node_id.into(), config);
    }

    /// Builder-style insert
    pub fn with_node(mut self, node_id: impl Into<String>, config: NodeConfig) -> Self {
        self.insert(node_id, config);
        self
    }

    pub fn remove(&mut self, node_id: &str) -> Option<NodeConfig> {
        self.nodes.remove(node_id)
    }

    pub fn get(&self, node_id: &str) -> Option<&NodeConfig> {
        self.nodes.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Node ids in lexicographic order
    pub fn node_ids(&self) -> BTreeSet<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Iterate over nodes in lexicographic order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeConfig)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids added and removed going from `previous` to `self`
    pub fn diff(&self, previous: &TopologySnapshot) -> (BTreeSet<String>, BTreeSet<String>) {
        let current = self.node_ids();
        let before = previous.node_ids();
        let added = current.difference(&before).cloned().collect();
        let removed = before.difference(&current).cloned().collect();
        (added, removed)
    }
}

/// Services managed by the per-node agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Monitor,
    Manager,
    Osd,
    Mds,
    Rgw,
}

impl ServiceKind {
    /// Stable name used in store keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Monitor => "monitor",
            ServiceKind::Manager => "cephmgr",
            ServiceKind::Osd => "osd",
            ServiceKind::Mds => "mds",
            ServiceKind::Rgw => "rgw",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quorum member placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorAssignment {
    pub node_id: String,
    pub index: u32,
    pub ip_address: String,
    pub port: u16,
}

impl MonitorAssignment {
    pub fn new(node_id: impl Into<String>, index: u32, ip_address: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            index,
            ip_address: ip_address.into(),
            port: MONITOR_PORT,
        }
    }

    /// Monitor identifier as published, e.g. `mon0`
    pub fn id(&self) -> String {
        format!("mon{}", self.index)
    }

    /// Parse the numeric index out of a `mon<N>` identifier
    pub fn parse_index(id: &str) -> Option<u32> {
        id.strip_prefix("mon").and_then(|n| n.parse().ok())
    }
}

/// Per-service desired state for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlacement {
    pub node_id: String,
    pub kind: ServiceKind,
    pub ready: bool,
    pub devices: Vec<String>,
}

/// Completion status reported by a node agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Succeeded,
    Failed,
    Pending,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Succeeded => "succeeded",
            AgentStatus::Failed => "failed",
            AgentStatus::Pending => "pending",
        }
    }

    /// Interpret a raw status value; anything unknown is still in progress
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "succeeded" => AgentStatus::Succeeded,
            "failed" => AgentStatus::Failed,
            _ => AgentStatus::Pending,
        }
    }
}

/// Per-node, per-service completion report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatusRecord {
    pub node_id: String,
    pub service: ServiceKind,
    pub status: AgentStatus,
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub fsid: String,
    pub bootstrap: bool,
    pub monitors: Vec<String>,
    pub new_monitors: Vec<String>,
    pub osd_nodes: Vec<String>,
    pub triggered: Vec<String>,
    pub agent_statuses: Vec<AgentStatusRecord>,
}

impl ReconcileSummary {
    pub fn failed_agents(&self) -> usize {
        self.agent_statuses
            .iter()
            .filter(|r| r.status == AgentStatus::Failed)
            .count()
    }

    pub fn succeeded_agents(&self) -> usize {
        self.agent_statuses
            .iter()
            .filter(|r| r.status == AgentStatus::Succeeded)
            .count()
    }
}
