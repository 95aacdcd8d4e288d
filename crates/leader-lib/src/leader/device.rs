//! Device watch routing

use crate::context::Context;
use crate::error::Result;
use crate::keys;
use crate::store::WatchEvent;
use crate::writer::DesiredStateWriter;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Outcome of a node-scoped device reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRetrigger {
    pub node_id: String,
    /// Devices currently desired for the node
    pub devices: BTreeSet<String>,
    /// Generation the node's OSD record was advanced to
    pub generation: u64,
    /// True if the ready flag was raised by this call
    pub raised: bool,
}

/// Watch callback for `.../osd/desired/<node>/device/<device>` changes.
///
/// Without a context there is nothing to reconcile against and the event is
/// dropped. A key that does not name a device fails with `MalformedKey`,
/// which callers skip.
pub async fn handle_device_changed(event: &WatchEvent, context: Option<&Context>) -> Result<()> {
    let context = match context {
        Some(context) => context,
        None => {
            debug!(key = %event.key, "No context for device change, ignoring");
            return Ok(());
        }
    };

    let node_id = keys::extract_node_id(&event.key)?;
    info!(
        node = %node_id,
        key = %event.key,
        action = ?event.action,
        "Desired device changed"
    );
    reconcile_node_devices(context, &node_id).await?;
    Ok(())
}

/// Re-trigger the OSD agent of a single node.
///
/// Always advances the node's generation, so an agent that already acted on
/// the record sees a change. A node that was never triggered also gets its
/// ready flag.
pub async fn reconcile_node_devices(context: &Context, node_id: &str) -> Result<NodeRetrigger> {
    let writer = DesiredStateWriter::new(context.store.clone());
    let devices = writer.osd_devices(node_id).await?;
    let raised = writer.mark_ready(node_id).await?;
    let generation = writer.bump_generation(node_id).await?;
    debug!(
        node = %node_id,
        devices = devices.len(),
        generation = generation,
        raised = raised,
        "Re-triggered node OSDs"
    );
    Ok(NodeRetrigger {
        node_id: node_id.to_string(),
        devices,
        generation,
        raised,
    })
}
