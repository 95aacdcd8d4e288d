//! Refresh dispatch loop
//!
//! Drives the leader: a periodic tick and any change under the refresh
//! namespaces trigger a reconciliation pass, while device changes are routed
//! to the node they belong to. Passes run one at a time on the loop's task.

use crate::context::{Context, RefreshEvent};
use crate::error::LeaderError;
use crate::health::{components, HealthRegistry};
use crate::inventory::InventoryProvider;
use crate::keys;
use crate::leader::Leader;
use crate::models::TopologySnapshot;
use crate::observability::StructuredLogger;
use crate::store::WatchEvent;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{StreamExt, StreamMap};
use tracing::{debug, info, warn};

/// Configuration for the refresh loop
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Periodic refresh interval (default: 60 seconds)
    pub interval: Duration,
    /// Quiet period after a watched change before refreshing (default: 500ms)
    pub debounce: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            debounce: Duration::from_millis(500),
        }
    }
}

/// Loop that serializes all reconciliation work for one leader
pub struct RefreshLoop {
    leader: Leader,
    context: Context,
    inventory: Arc<dyn InventoryProvider>,
    config: RefreshConfig,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    /// Topology of the last pass that succeeded
    last_topology: TopologySnapshot,
}

impl RefreshLoop {
    pub fn new(
        leader: Leader,
        context: Context,
        inventory: Arc<dyn InventoryProvider>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            leader,
            context,
            inventory,
            config,
            health: None,
            logger: None,
            last_topology: TopologySnapshot::new(),
        }
    }

    pub fn leader(&self) -> &Leader {
        &self.leader
    }

    /// Run until `shutdown` fires
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting refresh loop"
        );

        let mut watches = StreamMap::new();
        for key in self.leader.refresh_keys() {
            match self.context.store.watch(&key.path).await {
                Ok(rx) => {
                    watches.insert(key.path.clone(), UnboundedReceiverStream::new(rx));
                }
                Err(e) => {
                    warn!(key = %key.path, error = %e, "Failed to watch refresh key");
                    self.set_unhealthy(components::DISPATCHER, e.to_string()).await;
                }
            }
        }
        if watches.len() == self.leader.refresh_keys().len() {
            self.set_healthy(components::DISPATCHER).await;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let debounce = sleep(self.config.debounce);
        tokio::pin!(debounce);
        let mut pending = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    pending = false;
                    self.refresh().await;
                }
                Some((root, event)) = watches.next() => {
                    if self.dispatch(&root, event).await {
                        pending = true;
                        debounce.as_mut().reset(Instant::now() + self.config.debounce);
                    }
                }
                () = &mut debounce, if pending => {
                    pending = false;
                    self.refresh().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down refresh loop");
                    break;
                }
            }
        }
    }

    /// Handle one watch event. Returns true if it calls for a refresh.
    async fn dispatch(&self, root: &str, event: WatchEvent) -> bool {
        if !keys::is_device_key(&event.key) {
            debug!(root = %root, key = %event.key, "Refresh key changed");
            return true;
        }

        match self
            .leader
            .handle_device_changed(&event, Some(&self.context))
            .await
        {
            Ok(()) => {
                if let (Some(logger), Ok(node)) =
                    (&self.logger, keys::extract_node_id(&event.key))
                {
                    logger.log_device_change(&node, &event.key);
                }
            }
            Err(e) if e.is_skippable() => {
                debug!(key = %event.key, error = %e, "Skipping device event");
            }
            Err(e) => {
                warn!(key = %event.key, error = %e, "Device change handling failed");
            }
        }
        false
    }

    /// Run one pass against a fresh inventory snapshot
    async fn refresh(&mut self) {
        let topology = match self.inventory.snapshot().await {
            Ok(topology) => topology,
            Err(e) => {
                warn!(error = %e, "Failed to read inventory, skipping refresh");
                self.set_degraded(components::DISPATCHER, e.to_string()).await;
                return;
            }
        };

        let (added, removed) = topology.diff(&self.last_topology);
        let event = RefreshEvent::new(Arc::new(topology.clone()), self.context.clone())
            .with_added(added)
            .with_removed(removed);

        let start = Instant::now();
        let outcome = self.leader.handle_refresh(&event).await;
        let elapsed_ms = start.elapsed().as_millis();

        match outcome {
            Ok(()) => {
                self.last_topology = topology;
                self.set_healthy(components::STORE).await;
                self.set_healthy(components::DISPATCHER).await;
                if let Some(summary) = self.leader.last_summary() {
                    if let Some(logger) = &self.logger {
                        logger.log_reconcile(summary, elapsed_ms);
                    }
                    if let Some(health) = &self.health {
                        health.record_pass(Ok(summary)).await;
                    }
                }
            }
            Err(e) => {
                if matches!(e, LeaderError::Store { .. }) {
                    self.set_unhealthy(components::STORE, e.to_string()).await;
                }
                if let Some(health) = &self.health {
                    health.record_pass(Err(e.to_string())).await;
                }
                debug!(elapsed_ms = elapsed_ms, "Pass will be retried on the next trigger");
            }
        }
    }

    async fn set_healthy(&self, component: &str) {
        if let Some(health) = &self.health {
            health.set_healthy(component).await;
        }
    }

    async fn set_degraded(&self, component: &str, message: String) {
        if let Some(health) = &self.health {
            health.set_degraded(component, message).await;
        }
    }

    async fn set_unhealthy(&self, component: &str, message: String) {
        if let Some(health) = &self.health {
            health.set_unhealthy(component, message).await;
        }
    }
}

/// Builder for creating the refresh loop
pub struct RefreshLoopBuilder {
    leader: Option<Leader>,
    context: Option<Context>,
    inventory: Option<Arc<dyn InventoryProvider>>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: RefreshConfig,
}

impl RefreshLoopBuilder {
    pub fn new() -> Self {
        Self {
            leader: None,
            context: None,
            inventory: None,
            health: None,
            logger: None,
            config: RefreshConfig::default(),
        }
    }

    pub fn leader(mut self, leader: Leader) -> Self {
        self.leader = Some(leader);
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    pub fn inventory(mut self, inventory: Arc<dyn InventoryProvider>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    /// Report pass outcomes to a health registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Set the periodic refresh interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.config.debounce = debounce;
        self
    }

    /// Build the refresh loop
    pub fn build(self) -> Result<RefreshLoop> {
        let leader = self
            .leader
            .ok_or_else(|| anyhow::anyhow!("Leader is required"))?;
        let context = self
            .context
            .ok_or_else(|| anyhow::anyhow!("Context is required"))?;
        let inventory = self
            .inventory
            .ok_or_else(|| anyhow::anyhow!("Inventory is required"))?;

        let mut refresh_loop = RefreshLoop::new(leader, context, inventory, self.config);
        refresh_loop.health = self.health;
        refresh_loop.logger = self.logger;
        Ok(refresh_loop)
    }
}

impl Default for RefreshLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockExecutor;
    use crate::health::ComponentStatus;
    use crate::inventory::StaticInventory;
    use crate::models::NodeConfig;
    use crate::store::{KeyValueStore, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        inventory: Arc<StaticInventory>,
        health: HealthRegistry,
        shutdown: broadcast::Sender<()>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(topology: TopologySnapshot) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let inventory = Arc::new(StaticInventory::new(topology));
        let health = HealthRegistry::new();
        let context = Context::new(store.clone(), Arc::new(MockExecutor::with_secret("mysecret")));

        let refresh_loop = RefreshLoopBuilder::new()
            .leader(Leader::new(""))
            .context(context)
            .inventory(inventory.clone())
            .health(health.clone())
            .logger(StructuredLogger::new("test-node"))
            .interval(Duration::from_millis(50))
            .debounce(Duration::from_millis(10))
            .build()
            .unwrap();

        let (shutdown, rx) = broadcast::channel(1);
        let handle = tokio::spawn(refresh_loop.run(rx));
        Fixture {
            store,
            inventory,
            health,
            shutdown,
            handle,
        }
    }

    async fn wait_for(store: &MemoryStore, key: &str, expected: &str) {
        for _ in 0..200 {
            if store.value(key).as_deref() == Some(expected) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} = {}", key, expected);
    }

    async fn wait_for_store_status(health: &HealthRegistry, expected: ComponentStatus) {
        for _ in 0..200 {
            let status = health
                .health()
                .await
                .components
                .get(components::STORE)
                .map(|c| c.status);
            if status == Some(expected) {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for store to become {:?}", expected);
    }

    fn one_node() -> TopologySnapshot {
        TopologySnapshot::new().with_node("a", NodeConfig::new("1.2.3.4").with_devices(["sda"]))
    }

    #[test]
    fn test_refresh_config_default() {
        let config = RefreshConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.debounce, Duration::from_millis(500));
    }

    #[test]
    fn test_builder_missing_inventory() {
        let context = Context::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MockExecutor::with_secret("s")),
        );
        let result = RefreshLoopBuilder::new()
            .leader(Leader::new(""))
            .context(context)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_loop_bootstraps_and_tracks_inventory() {
        let fixture = start(one_node());

        wait_for(&fixture.store, "/rook/services/ceph/osd/desired/a/ready", "1").await;
        wait_for(&fixture.store, "/rook/services/ceph/monitor/desired/a/id", "mon0").await;

        fixture
            .inventory
            .add_node("b", NodeConfig::new("5.6.7.8"))
            .await;
        wait_for(&fixture.store, "/rook/services/ceph/osd/desired/b/ready", "1").await;
        wait_for(&fixture.store, "/rook/services/ceph/monitor/desired/b/id", "mon1").await;
        assert!(fixture.health.readiness().await.ready);

        fixture.shutdown.send(()).unwrap();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_device_change_retriggers_ready_node() {
        let fixture = start(one_node());
        let ready = "/rook/services/ceph/osd/desired/a/ready";
        let generation = "/rook/services/ceph/osd/desired/a/generation";

        // Publishing sda during bootstrap is itself a device change
        wait_for(&fixture.store, ready, "1").await;
        wait_for(&fixture.store, generation, "1").await;

        fixture
            .store
            .set("/rook/services/ceph/osd/desired/a/device/sdb", "1")
            .await
            .unwrap();
        wait_for(&fixture.store, generation, "2").await;
        assert_eq!(fixture.store.value(ready).as_deref(), Some("1"));

        fixture
            .store
            .delete("/rook/services/ceph/osd/desired/a/device/sdb")
            .await
            .unwrap();
        wait_for(&fixture.store, generation, "3").await;

        fixture.shutdown.send(()).unwrap();
        fixture.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_pass_recovers() {
        let fixture = start(TopologySnapshot::new());
        fixture
            .store
            .fail_writes_under("/rook/services/ceph/osd", "disk full");
        fixture.inventory.add_node("a", NodeConfig::new("1.2.3.4")).await;

        wait_for_store_status(&fixture.health, ComponentStatus::Unhealthy).await;
        assert!(fixture.store.value("/rook/services/ceph/osd/desired/a/ready").is_none());

        fixture.store.clear_failures();
        wait_for(&fixture.store, "/rook/services/ceph/osd/desired/a/ready", "1").await;
        wait_for_store_status(&fixture.health, ComponentStatus::Healthy).await;

        fixture.shutdown.send(()).unwrap();
        fixture.handle.await.unwrap();
    }
}
