//! Node inventory seam

use crate::error::Result;
use crate::models::{NodeConfig, TopologySnapshot};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of the current node topology
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    async fn snapshot(&self) -> Result<TopologySnapshot>;
}

/// Inventory held in memory, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticInventory {
    topology: RwLock<TopologySnapshot>,
}

impl StaticInventory {
    pub fn new(topology: TopologySnapshot) -> Self {
        Self {
            topology: RwLock::new(topology),
        }
    }

    pub async fn add_node(&self, node_id: impl Into<String>, config: NodeConfig) {
        let node_id = node_id.into();
        debug!(node = %node_id, "Adding node to inventory");
        self.topology.write().await.insert(node_id, config);
    }

    pub async fn remove_node(&self, node_id: &str) -> Option<NodeConfig> {
        debug!(node = %node_id, "Removing node from inventory");
        self.topology.write().await.remove(node_id)
    }

    pub async fn replace(&self, topology: TopologySnapshot) {
        *self.topology.write().await = topology;
    }
}

#[async_trait]
impl InventoryProvider for StaticInventory {
    async fn snapshot(&self) -> Result<TopologySnapshot> {
        Ok(self.topology.read().await.clone())
    }
}
