//! Placement policy
//!
//! Pure functions from a topology snapshot plus existing assignments to the
//! desired placement. Nothing here touches the store.

use crate::error::{LeaderError, Result};
use crate::keys;
use crate::models::{MonitorAssignment, NodeConfig, ServiceKind, ServicePlacement, TopologySnapshot};
use std::collections::BTreeSet;
use tracing::warn;

/// Default number of monitors forming the quorum
pub const DEFAULT_MONITOR_COUNT: usize = 3;

/// Allowlist of device names eligible for OSDs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    /// `None` admits every device
    allowed: Option<BTreeSet<String>>,
}

impl DeviceFilter {
    /// Parse a comma separated allowlist. Empty or `all` admits everything.
    pub fn parse(filter: &str) -> Self {
        let trimmed = filter.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Self::default();
        }

        let allowed = trimmed
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            allowed: Some(allowed),
        }
    }

    pub fn admits_all(&self) -> bool {
        self.allowed.is_none()
    }

    pub fn admits(&self, device: &str) -> bool {
        match &self.allowed {
            Some(allowed) => allowed.contains(device),
            None => true,
        }
    }

    /// Devices of `node` that pass the filter, sorted and deduplicated
    pub fn eligible_devices(&self, node: &NodeConfig) -> Vec<String> {
        node.devices
            .iter()
            .filter(|d| self.admits(d))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Pick monitors for unassigned nodes until the quorum reaches `target`.
///
/// Returns only the new assignments. Existing assignments are never moved or
/// renumbered, and new ids continue after the highest id ever handed out.
/// Only monitors on nodes still in the topology count toward `target`, so
/// nodes that left are replaced without freeing their ids.
pub fn plan_monitors(
    topology: &TopologySnapshot,
    current: &[MonitorAssignment],
    target: usize,
) -> Result<Vec<MonitorAssignment>> {
    let assigned: BTreeSet<&str> = current.iter().map(|m| m.node_id.as_str()).collect();
    let highest = current.iter().map(|m| m.index).max();
    let mut next_index = match highest {
        Some(index) => index.checked_add(1),
        None => Some(0),
    };
    let mut quorum = current
        .iter()
        .filter(|m| topology.contains(&m.node_id))
        .count();

    let mut candidates: Vec<(&String, &NodeConfig)> = topology
        .iter()
        .filter(|(id, _)| !assigned.contains(id.as_str()))
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(b.0));

    let mut planned = Vec::new();
    for (node_id, node) in candidates {
        if quorum >= target {
            break;
        }
        if node.public_ip.is_empty() {
            warn!(node = %node_id, "Skipping monitor placement for node without a public IP");
            continue;
        }
        let index = next_index.ok_or_else(|| LeaderError::InvalidValue {
            key: keys::MONITOR_DESIRED.to_string(),
            value: format!("mon{}", u32::MAX),
        })?;
        planned.push(MonitorAssignment::new(
            node_id.clone(),
            index,
            node.public_ip.clone(),
        ));
        next_index = index.checked_add(1);
        quorum += 1;
    }
    Ok(planned)
}

/// Desired OSD placement for every node in the snapshot.
///
/// The ready flag is left unset; the leader decides it per pass.
pub fn plan_osds(topology: &TopologySnapshot, filter: &DeviceFilter) -> Vec<ServicePlacement> {
    topology
        .iter()
        .map(|(node_id, node)| ServicePlacement {
            node_id: node_id.clone(),
            kind: ServiceKind::Osd,
            ready: false,
            devices: filter.eligible_devices(node),
        })
        .collect()
}
