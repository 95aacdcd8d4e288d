//! Call-scoped collaborators and the refresh trigger

use crate::exec::CommandExecutor;
use crate::models::TopologySnapshot;
use crate::store::KeyValueStore;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Handles a reconciliation pass needs to reach the outside world
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn KeyValueStore>,
    pub executor: Arc<dyn CommandExecutor>,
}

impl Context {
    pub fn new(store: Arc<dyn KeyValueStore>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { store, executor }
    }
}

/// Trigger for one reconciliation pass
#[derive(Clone)]
pub struct RefreshEvent {
    pub topology: Arc<TopologySnapshot>,
    pub nodes_added: BTreeSet<String>,
    pub nodes_removed: BTreeSet<String>,
    pub context: Context,
}

impl RefreshEvent {
    /// A refresh with no topology diff
    pub fn new(topology: Arc<TopologySnapshot>, context: Context) -> Self {
        Self {
            topology,
            nodes_added: BTreeSet::new(),
            nodes_removed: BTreeSet::new(),
            context,
        }
    }

    pub fn with_added<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes_added.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn with_removed<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes_removed.extend(nodes.into_iter().map(Into::into));
        self
    }
}
