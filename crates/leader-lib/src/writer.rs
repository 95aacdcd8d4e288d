//! Desired-state records in the store
//!
//! All writes go through [`DesiredStateWriter::set_if_changed`], so replaying
//! a pass against an already converged store issues no writes and fires no
//! watches. Multi-key records are written with their completion marker last.

use crate::error::{LeaderError, Result};
use crate::keys;
use crate::models::{AgentStatus, AgentStatusRecord, MonitorAssignment, ServiceKind, ServicePlacement};
use crate::store::KeyValueStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

const READY: &str = "1";
const NOT_READY: &str = "0";
const DEVICE_DESIRED: &str = "1";

/// Reads and writes the desired-state namespace
#[derive(Clone)]
pub struct DesiredStateWriter {
    store: Arc<dyn KeyValueStore>,
}

impl DesiredStateWriter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Write `value` unless the key already holds it. Returns true if written.
    pub async fn set_if_changed(&self, key: &str, value: &str) -> Result<bool> {
        if self.store.get(key).await?.as_deref() == Some(value) {
            return Ok(false);
        }
        self.store.set(key, value).await?;
        debug!(key = %key, value = %value, "Updated desired state");
        Ok(true)
    }

    /// Monitor assignments currently published, sorted by monitor index
    pub async fn monitors(&self) -> Result<Vec<MonitorAssignment>> {
        let mut monitors = Vec::new();
        for node_id in self.store.list_children(keys::MONITOR_DESIRED).await? {
            let base = keys::monitor_desired_key(&node_id);
            let id_key = format!("{}/id", base);

            // The id is written last; without it the record is incomplete
            // and the node is treated as unassigned.
            let id = match self.store.get(&id_key).await? {
                Some(id) => id,
                None => {
                    warn!(node = %node_id, "Ignoring incomplete monitor record");
                    continue;
                }
            };
            let index = MonitorAssignment::parse_index(&id).ok_or_else(|| {
                LeaderError::InvalidValue {
                    key: id_key.clone(),
                    value: id.clone(),
                }
            })?;

            let ip_key = format!("{}/ipaddress", base);
            let ip_address = self.store.get(&ip_key).await?.unwrap_or_default();

            let port_key = format!("{}/port", base);
            let mut assignment = MonitorAssignment::new(node_id, index, ip_address);
            if let Some(port) = self.store.get(&port_key).await? {
                assignment.port = port.parse().map_err(|_| LeaderError::InvalidValue {
                    key: port_key.clone(),
                    value: port.clone(),
                })?;
            }
            monitors.push(assignment);
        }
        monitors.sort_by_key(|m| m.index);
        Ok(monitors)
    }

    /// Publish a monitor assignment
    pub async fn write_monitor(&self, monitor: &MonitorAssignment) -> Result<()> {
        let base = keys::monitor_desired_key(&monitor.node_id);
        self.set_if_changed(&format!("{}/ipaddress", base), &monitor.ip_address)
            .await?;
        self.set_if_changed(&format!("{}/port", base), &monitor.port.to_string())
            .await?;
        self.set_if_changed(&format!("{}/id", base), &monitor.id())
            .await?;
        Ok(())
    }

    /// Nodes with an OSD desired-state record
    pub async fn osd_nodes(&self) -> Result<BTreeSet<String>> {
        self.store.list_children(keys::OSD_DESIRED).await
    }

    /// Devices published for a node's OSDs
    pub async fn osd_devices(&self, node_id: &str) -> Result<BTreeSet<String>> {
        self.store.list_children(&keys::osd_devices_key(node_id)).await
    }

    /// Whether the node's OSD record carries the ready flag
    pub async fn is_ready(&self, node_id: &str) -> Result<bool> {
        Ok(self.store.get(&keys::osd_ready_key(node_id)).await?.as_deref() == Some(READY))
    }

    /// Set the ready flag. Returns true if it was not already set.
    pub async fn mark_ready(&self, node_id: &str) -> Result<bool> {
        self.set_if_changed(&keys::osd_ready_key(node_id), READY).await
    }

    /// Current re-trigger generation of a node's OSD record, 0 if never bumped
    pub async fn generation(&self, node_id: &str) -> Result<u64> {
        let key = keys::osd_generation_key(node_id);
        match self.store.get(&key).await? {
            Some(value) => value
                .parse()
                .map_err(|_| LeaderError::InvalidValue { key, value }),
            None => Ok(0),
        }
    }

    /// Advance the node's generation so its OSD agent re-applies the record.
    /// Returns the new generation.
    pub async fn bump_generation(&self, node_id: &str) -> Result<u64> {
        let key = keys::osd_generation_key(node_id);
        let current = self.generation(node_id).await?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| LeaderError::InvalidValue {
                key: key.clone(),
                value: current.to_string(),
            })?;
        self.store.set(&key, &next.to_string()).await?;
        debug!(node = %node_id, generation = next, "Bumped OSD generation");
        Ok(next)
    }

    /// Publish a node's OSD record.
    ///
    /// A ready flag is never cleared here; a record that is not ready only gets
    /// a `0` flag if it had none, so the node shows up in the desired set.
    pub async fn write_osd(&self, placement: &ServicePlacement) -> Result<()> {
        for device in &placement.devices {
            self.set_if_changed(&keys::osd_device_key(&placement.node_id, device), DEVICE_DESIRED)
                .await?;
        }

        let ready_key = keys::osd_ready_key(&placement.node_id);
        if placement.ready {
            self.set_if_changed(&ready_key, READY).await?;
        } else if self.store.get(&ready_key).await?.is_none() {
            self.store.set(&ready_key, NOT_READY).await?;
        }
        Ok(())
    }

    /// Read the status an agent reported for one of its services
    pub async fn agent_status(
        &self,
        node_id: &str,
        service: ServiceKind,
    ) -> Result<Option<AgentStatusRecord>> {
        let key = keys::agent_status_key(node_id, service);
        Ok(self
            .store
            .get(&key)
            .await?
            .map(|value| AgentStatusRecord {
                node_id: node_id.to_string(),
                service,
                status: AgentStatus::parse(&value),
            }))
    }
}
