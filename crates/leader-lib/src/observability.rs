//! Observability infrastructure for the leader
//!
//! Provides:
//! - Prometheus metrics (pass latency, pass outcomes, quorum and OSD sizes)
//! - Structured JSON logging of lifecycle events with tracing

use crate::models::ReconcileSummary;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for reconciliation latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<LeaderMetricsInner> = OnceLock::new();

struct LeaderMetricsInner {
    reconcile_passes: IntCounter,
    reconcile_errors: IntCounter,
    reconcile_latency_seconds: Histogram,
    monitors_assigned: IntGauge,
    osd_nodes: IntGauge,
    bootstrapped: IntGauge,
    device_events: IntCounter,
}

impl LeaderMetricsInner {
    fn new() -> Self {
        Self {
            reconcile_passes: register_int_counter!(
                "ceph_leader_reconcile_passes_total",
                "Reconciliation passes completed successfully"
            )
            .expect("Failed to register reconcile_passes_total"),

            reconcile_errors: register_int_counter!(
                "ceph_leader_reconcile_errors_total",
                "Reconciliation passes aborted by an error"
            )
            .expect("Failed to register reconcile_errors_total"),

            reconcile_latency_seconds: register_histogram!(
                "ceph_leader_reconcile_latency_seconds",
                "Time spent in a single reconciliation pass",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register reconcile_latency_seconds"),

            monitors_assigned: register_int_gauge!(
                "ceph_leader_monitors_assigned",
                "Monitors currently assigned in the desired state"
            )
            .expect("Failed to register monitors_assigned"),

            osd_nodes: register_int_gauge!(
                "ceph_leader_osd_nodes",
                "Nodes with an OSD desired-state record"
            )
            .expect("Failed to register osd_nodes"),

            bootstrapped: register_int_gauge!(
                "ceph_leader_bootstrapped",
                "1 once the first reconciliation pass has converged"
            )
            .expect("Failed to register bootstrapped"),

            device_events: register_int_counter!(
                "ceph_leader_device_events_total",
                "Device watch events routed to a node"
            )
            .expect("Failed to register device_events_total"),
        }
    }
}

/// Leader metrics for Prometheus exposition
///
/// A lightweight handle; clones share the process-wide metrics.
#[derive(Clone)]
pub struct LeaderMetrics {
    _private: (),
}

impl Default for LeaderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(LeaderMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &LeaderMetricsInner {
        GLOBAL_METRICS.get_or_init(LeaderMetricsInner::new)
    }

    /// Record a pass that ran to completion
    pub fn observe_pass(&self, duration_secs: f64, summary: &ReconcileSummary) {
        let inner = self.inner();
        inner.reconcile_passes.inc();
        inner.reconcile_latency_seconds.observe(duration_secs);
        inner.monitors_assigned.set(summary.monitors.len() as i64);
        inner.osd_nodes.set(summary.osd_nodes.len() as i64);
        inner.bootstrapped.set(1);
    }

    /// Record a pass that failed
    pub fn observe_failed_pass(&self, duration_secs: f64) {
        let inner = self.inner();
        inner.reconcile_errors.inc();
        inner.reconcile_latency_seconds.observe(duration_secs);
    }

    pub fn inc_device_events(&self) {
        self.inner().device_events.inc();
    }
}

/// Structured logger for leader lifecycle events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, agents: &[&str]) {
        info!(
            event = "leader_started",
            node = %self.node_name,
            version = %version,
            agents = ?agents,
            "Ceph leader started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "leader_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Ceph leader shutting down"
        );
    }

    /// Log the outcome of a completed pass
    pub fn log_reconcile(&self, summary: &ReconcileSummary, elapsed_ms: u128) {
        if summary.bootstrap {
            info!(
                event = "cluster_bootstrapped",
                node = %self.node_name,
                fsid = %summary.fsid,
                triggered = ?summary.triggered,
                "Bootstrapped OSD desired state"
            );
        }
        for monitor in &summary.new_monitors {
            info!(
                event = "monitor_assigned",
                node = %self.node_name,
                monitor = %monitor,
                "Assigned monitor"
            );
        }

        let failed = summary.failed_agents();
        if failed > 0 {
            warn!(
                event = "reconcile_completed",
                node = %self.node_name,
                monitors = summary.monitors.len(),
                osd_nodes = summary.osd_nodes.len(),
                failed_agents = failed,
                elapsed_ms = elapsed_ms,
                "Reconciliation completed with failed agents"
            );
        } else {
            info!(
                event = "reconcile_completed",
                node = %self.node_name,
                monitors = summary.monitors.len(),
                osd_nodes = summary.osd_nodes.len(),
                succeeded_agents = summary.succeeded_agents(),
                elapsed_ms = elapsed_ms,
                "Reconciliation completed"
            );
        }
    }

    pub fn log_device_change(&self, target_node: &str, key: &str) {
        info!(
            event = "device_changed",
            node = %self.node_name,
            target_node = %target_node,
            key = %key,
            "Routed device change to node"
        );
    }
}
