//! Store key namespace
//!
//! Every key the leader reads or writes lives under one of the prefixes
//! below. The literal prefixes are shared with the node agents and must not
//! change.

use crate::error::{LeaderError, Result};
use crate::models::ServiceKind;

pub const CEPH_ROOT: &str = "/rook/services/ceph";
pub const NOTIFY_ROOT: &str = "/rook/_notify";

pub const FSID_KEY: &str = "/rook/services/ceph/fsid";
pub const NAME_KEY: &str = "/rook/services/ceph/name";
pub const ADMIN_SECRET_KEY: &str = "/rook/services/ceph/_secrets/admin";
pub const MONITOR_SECRET_KEY: &str = "/rook/services/ceph/_secrets/monitor";

pub const MONITOR_DESIRED: &str = "/rook/services/ceph/monitor/desired";
pub const MANAGER_DESIRED: &str = "/rook/services/ceph/mgr/desired";
pub const OSD_DESIRED: &str = "/rook/services/ceph/osd/desired";
pub const FS_DESIRED: &str = "/rook/services/ceph/fs/desired";
pub const OBJECT_DESIRED: &str = "/rook/services/ceph/object/desired";

/// Segment separating a node's OSD record from its per-device entries
const DEVICE_SEGMENT: &str = "device";

/// `.../monitor/desired/<node>`
pub fn monitor_desired_key(node_id: &str) -> String {
    format!("{}/{}", MONITOR_DESIRED, node_id)
}

/// `.../osd/desired/<node>`
pub fn osd_desired_key(node_id: &str) -> String {
    format!("{}/{}", OSD_DESIRED, node_id)
}

/// `.../osd/desired/<node>/ready`
pub fn osd_ready_key(node_id: &str) -> String {
    format!("{}/{}/ready", OSD_DESIRED, node_id)
}

/// `.../osd/desired/<node>/generation`, bumped to re-trigger the node's agent
pub fn osd_generation_key(node_id: &str) -> String {
    format!("{}/{}/generation", OSD_DESIRED, node_id)
}

/// `.../osd/desired/<node>/device`
pub fn osd_devices_key(node_id: &str) -> String {
    format!("{}/{}/{}", OSD_DESIRED, node_id, DEVICE_SEGMENT)
}

/// `.../osd/desired/<node>/device/<device>`
pub fn osd_device_key(node_id: &str, device: &str) -> String {
    format!("{}/{}/{}/{}", OSD_DESIRED, node_id, DEVICE_SEGMENT, device)
}

/// `/rook/_notify/<node>/<service>/status`
pub fn agent_status_key(node_id: &str, service: ServiceKind) -> String {
    format!("{}/{}/{}/status", NOTIFY_ROOT, node_id, service.as_str())
}

/// What a watched namespace holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTag {
    OsdDesired,
    FsDesired,
    ObjectDesired,
}

/// A watched namespace prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshKey {
    pub path: String,
    pub tag: RefreshTag,
}

impl RefreshKey {
    fn new(path: &str, tag: RefreshTag) -> Self {
        Self {
            path: path.to_string(),
            tag,
        }
    }

    /// Returns true if `key` is the prefix itself or lives below it
    pub fn matches(&self, key: &str) -> bool {
        key == self.path
            || key
                .strip_prefix(self.path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// The namespaces the leader watches, in registration order
pub fn refresh_keys() -> Vec<RefreshKey> {
    vec![
        RefreshKey::new(OSD_DESIRED, RefreshTag::OsdDesired),
        RefreshKey::new(FS_DESIRED, RefreshTag::FsDesired),
        RefreshKey::new(OBJECT_DESIRED, RefreshTag::ObjectDesired),
    ]
}

/// Returns true if `key` names a per-device OSD entry
pub fn is_device_key(key: &str) -> bool {
    extract_node_id(key).is_ok()
}

/// Extract the node id from `.../osd/desired/<node>/device/<device>`
pub fn extract_node_id(path: &str) -> Result<String> {
    let malformed = || LeaderError::MalformedKey(path.to_string());

    let rest = path
        .strip_prefix(OSD_DESIRED)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(malformed)?;

    let segments: Vec<&str> = rest.split('/').collect();
    match segments.as_slice() {
        [node, DEVICE_SEGMENT, device, ..] if !node.is_empty() && !device.is_empty() => {
            Ok(node.to_string())
        }
        _ => Err(malformed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_node_id() {
        let node = extract_node_id("/rook/services/ceph/osd/desired/abc/device/sdb").unwrap();
        assert_eq!(node, "abc");
    }

    #[test]
    fn test_extract_node_id_missing_segments() {
        let err = extract_node_id("/rook/services/ceph/osd/desired").unwrap_err();
        assert!(matches!(err, LeaderError::MalformedKey(_)));

        assert!(extract_node_id("/rook/services/ceph/osd/desired/abc").is_err());
        assert!(extract_node_id("/rook/services/ceph/osd/desired/abc/ready").is_err());
        assert!(extract_node_id("/rook/services/ceph/osd/desired/abc/device").is_err());
        assert!(extract_node_id("/rook/services/ceph/osd/desired//device/sdb").is_err());
    }

    #[test]
    fn test_extract_node_id_wrong_root() {
        assert!(extract_node_id("/rook/services/ceph/fs/desired/abc/device/sdb").is_err());
        assert!(extract_node_id("/rook/services/ceph/osd/desiredx/abc/device/sdb").is_err());
    }

    #[test]
    fn test_refresh_keys_order() {
        let keys = refresh_keys();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].path, "/rook/services/ceph/osd/desired");
        assert_eq!(keys[1].path, "/rook/services/ceph/fs/desired");
        assert_eq!(keys[2].path, "/rook/services/ceph/object/desired");
        assert_eq!(keys[0].tag, RefreshTag::OsdDesired);
    }

    #[test]
    fn test_refresh_key_matches() {
        let key = &refresh_keys()[0];
        assert!(key.matches("/rook/services/ceph/osd/desired"));
        assert!(key.matches("/rook/services/ceph/osd/desired/a/ready"));
        assert!(!key.matches("/rook/services/ceph/osd/desiredx"));
        assert!(!key.matches("/rook/services/ceph/fs/desired"));
    }

    #[test]
    fn test_key_builders() {
        assert_eq!(
            agent_status_key("a", ServiceKind::Osd),
            "/rook/_notify/a/osd/status"
        );
        assert_eq!(
            osd_device_key("a", "sdb"),
            "/rook/services/ceph/osd/desired/a/device/sdb"
        );
        assert_eq!(
            osd_generation_key("a"),
            "/rook/services/ceph/osd/desired/a/generation"
        );
        assert_eq!(
            monitor_desired_key("b"),
            "/rook/services/ceph/monitor/desired/b"
        );
    }
}
