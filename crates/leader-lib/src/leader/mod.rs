//! Reconciliation controller
//!
//! The elected leader turns each refresh event into one reconciliation pass:
//! ensure the cluster identity, extend the monitor quorum, publish OSD desired
//! state for every known node and raise ready flags for nodes the agents
//! should act on. Passes are idempotent; a failed pass leaves a valid subset
//! of its writes behind and the next pass picks up from there.
//!
//! Callers must serialize calls to [`Leader::handle_refresh`]; concurrent
//! passes would race on monitor id assignment.

mod device;


pub use device::{handle_device_changed, reconcile_node_devices, NodeRetrigger};

use crate::context::{Context, RefreshEvent};
use crate::error::Result;
use crate::identity;
use crate::keys::{self, RefreshKey};
use crate::models::{ReconcileSummary, ServiceKind};
use crate::observability::LeaderMetrics;
use crate::placement::{self, DeviceFilter, DEFAULT_MONITOR_COUNT};
use crate::store::WatchEvent;
use crate::writer::DesiredStateWriter;
use std::collections::BTreeSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Where the leader is in its bootstrap lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderPhase {
    /// No pass has completed since this leader took over. The next pass marks
    /// every known node that lacks a ready flag.
    Uninitialized,
    /// At least one pass completed. Only newly added or never seen nodes are
    /// marked ready.
    Converged,
}

/// The cluster reconciliation controller
pub struct Leader {
    device_filter: DeviceFilter,
    admin_secret: Option<String>,
    monitor_count: usize,
    phase: LeaderPhase,
    last_summary: Option<ReconcileSummary>,
    metrics: LeaderMetrics,
}

impl Leader {
    /// Create a leader that admits OSD devices matching `device_filter`
    pub fn new(device_filter: &str) -> Self {
        Self {
            device_filter: DeviceFilter::parse(device_filter),
            admin_secret: None,
            monitor_count: DEFAULT_MONITOR_COUNT,
            phase: LeaderPhase::Uninitialized,
            last_summary: None,
            metrics: LeaderMetrics::new(),
        }
    }

    /// Use `secret` as the admin secret if the cluster identity gets created
    pub fn with_admin_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.admin_secret = (!secret.is_empty()).then_some(secret);
        self
    }

    /// Target size of the monitor quorum
    pub fn with_monitor_count(mut self, count: usize) -> Self {
        self.monitor_count = count.max(1);
        self
    }

    pub fn phase(&self) -> LeaderPhase {
        self.phase
    }

    pub fn device_filter(&self) -> &DeviceFilter {
        &self.device_filter
    }

    pub fn monitor_count(&self) -> usize {
        self.monitor_count
    }

    /// Summary of the last pass that completed
    pub fn last_summary(&self) -> Option<&ReconcileSummary> {
        self.last_summary.as_ref()
    }

    /// Namespaces whose changes should trigger a refresh, in watch order
    pub fn refresh_keys(&self) -> Vec<RefreshKey> {
        keys::refresh_keys()
    }

    /// Run one reconciliation pass.
    ///
    /// Fails with the first collaborator error; writes issued before the
    /// failure stay in place.
    #[tracing::instrument(level = "debug", skip(self, event), fields(nodes = event.topology.len()))]
    pub async fn handle_refresh(&mut self, event: &RefreshEvent) -> Result<()> {
        let start = Instant::now();
        match self.reconcile(event).await {
            Ok(summary) => {
                self.metrics
                    .observe_pass(start.elapsed().as_secs_f64(), &summary);
                if self.phase == LeaderPhase::Uninitialized {
                    info!(fsid = %summary.fsid, "Desired state converged");
                }
                self.phase = LeaderPhase::Converged;
                self.last_summary = Some(summary);
                Ok(())
            }
            Err(e) => {
                self.metrics.observe_failed_pass(start.elapsed().as_secs_f64());
                error!(error = %e, "Reconciliation pass failed");
                Err(e)
            }
        }
    }

    /// Route a device watch event to its node.
    ///
    /// A missing context is tolerated and ignored.
    pub async fn handle_device_changed(
        &self,
        event: &WatchEvent,
        context: Option<&Context>,
    ) -> Result<()> {
        self.metrics.inc_device_events();
        handle_device_changed(event, context).await
    }

    async fn reconcile(&self, event: &RefreshEvent) -> Result<ReconcileSummary> {
        let context = &event.context;
        let topology = event.topology.as_ref();
        let writer = DesiredStateWriter::new(context.store.clone());

        let identity =
            identity::create_cluster_info(context, self.admin_secret.as_deref()).await?;

        // Monitors
        let mut monitors = writer.monitors().await?;
        let planned = placement::plan_monitors(topology, &monitors, self.monitor_count)?;
        for monitor in &planned {
            writer.write_monitor(monitor).await?;
            debug!(node = %monitor.node_id, id = %monitor.id(), "Published monitor");
        }
        for monitor in monitors.iter().filter(|m| !topology.contains(&m.node_id)) {
            warn!(
                node = %monitor.node_id,
                id = %monitor.id(),
                "Monitor assigned to a node missing from the topology"
            );
        }
        let new_monitors: Vec<String> = planned.iter().map(|m| m.id()).collect();
        monitors.extend(planned);

        // OSDs
        let prior = writer.osd_nodes().await?;
        let bootstrap = self.phase == LeaderPhase::Uninitialized && prior.is_empty();
        let mut triggered = Vec::new();
        for mut osd in placement::plan_osds(topology, &self.device_filter) {
            if self.should_trigger(&osd.node_id, &prior, event) && !writer.is_ready(&osd.node_id).await? {
                osd.ready = true;
                triggered.push(osd.node_id.clone());
            }
            writer.write_osd(&osd).await?;
        }
        for node_id in &event.nodes_removed {
            info!(node = %node_id, "Node removed from topology, keeping its desired state");
        }

        let osd_nodes = writer.osd_nodes().await?;

        // Agent reports
        let mut agent_statuses = Vec::new();
        for monitor in &monitors {
            if let Some(record) = writer.agent_status(&monitor.node_id, ServiceKind::Monitor).await? {
                agent_statuses.push(record);
            }
        }
        for node_id in &osd_nodes {
            if let Some(record) = writer.agent_status(node_id, ServiceKind::Osd).await? {
                agent_statuses.push(record);
            }
        }

        Ok(ReconcileSummary {
            fsid: identity.fsid,
            bootstrap,
            monitors: monitors.iter().map(|m| m.id()).collect(),
            new_monitors,
            osd_nodes: osd_nodes.into_iter().collect(),
            triggered,
            agent_statuses,
        })
    }

    /// Whether a node's OSD record is a candidate for the ready flag this pass
    fn should_trigger(&self, node_id: &str, prior: &BTreeSet<String>, event: &RefreshEvent) -> bool {
        match self.phase {
            LeaderPhase::Uninitialized => true,
            LeaderPhase::Converged => {
                !prior.contains(node_id) || event.nodes_added.contains(node_id)
            }
        }
    }
}
