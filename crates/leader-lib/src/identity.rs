//! Cluster identity bootstrap
//!
//! The fsid and the cluster secrets are created exactly once. Every later call
//! reads them back unchanged.

use crate::context::Context;
use crate::error::{LeaderError, Result};
use crate::keys::{ADMIN_SECRET_KEY, FSID_KEY, MONITOR_SECRET_KEY, NAME_KEY};
use crate::models::{ClusterIdentity, CLUSTER_NAME};
use tracing::{debug, info};
use uuid::Uuid;

const AUTHTOOL: &str = "ceph-authtool";

/// Return the persisted cluster identity, creating it if none exists.
///
/// `admin_secret` is only consulted when the identity is created; an existing
/// identity is returned as-is.
pub async fn create_cluster_info(
    context: &Context,
    admin_secret: Option<&str>,
) -> Result<ClusterIdentity> {
    if let Some(identity) = load_cluster_info(context).await? {
        debug!(fsid = %identity.fsid, "Cluster identity already exists");
        return Ok(identity);
    }

    let monitor_secret = generate_secret(context, "monitor").await?;
    let admin_secret = match admin_secret.filter(|s| !s.is_empty()) {
        Some(secret) => secret.to_string(),
        None => generate_secret(context, "admin").await?,
    };

    let identity = ClusterIdentity {
        fsid: Uuid::new_v4().to_string(),
        monitor_secret,
        admin_secret,
        name: CLUSTER_NAME.to_string(),
    };

    // The fsid goes last: its presence marks the identity as complete.
    let store = &context.store;
    store.set(MONITOR_SECRET_KEY, &identity.monitor_secret).await?;
    store.set(ADMIN_SECRET_KEY, &identity.admin_secret).await?;
    store.set(NAME_KEY, &identity.name).await?;
    store.set(FSID_KEY, &identity.fsid).await?;

    info!(fsid = %identity.fsid, name = %identity.name, "Created cluster identity");
    Ok(identity)
}

/// Read the persisted identity, `None` if it was never completed
pub async fn load_cluster_info(context: &Context) -> Result<Option<ClusterIdentity>> {
    let store = &context.store;
    let fsid = match store.get(FSID_KEY).await? {
        Some(fsid) if !fsid.is_empty() => fsid,
        _ => return Ok(None),
    };

    let monitor_secret = required(context, MONITOR_SECRET_KEY).await?;
    let admin_secret = required(context, ADMIN_SECRET_KEY).await?;
    let name = store
        .get(NAME_KEY)
        .await?
        .unwrap_or_else(|| CLUSTER_NAME.to_string());

    Ok(Some(ClusterIdentity {
        fsid,
        monitor_secret,
        admin_secret,
        name,
    }))
}

async fn required(context: &Context, key: &str) -> Result<String> {
    context
        .store
        .get(key)
        .await?
        .ok_or_else(|| LeaderError::store(key, "missing value for persisted cluster identity"))
}

async fn generate_secret(context: &Context, kind: &str) -> Result<String> {
    let secret = context
        .executor
        .execute_with_output(
            &format!("generate {} secret", kind),
            AUTHTOOL,
            &["--gen-print-key"],
        )
        .await
        .map_err(|e| LeaderError::IdentityGeneration(format!("{} secret: {}", kind, e)))?;

    if secret.is_empty() {
        return Err(LeaderError::IdentityGeneration(format!(
            "{} returned an empty {} secret",
            AUTHTOOL, kind
        )));
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockExecutor;
    use crate::store::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    fn test_context() -> (Context, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let context = Context::new(store.clone(), Arc::new(MockExecutor::with_secret("adminsecret")));
        (context, store)
    }

    #[tokio::test]
    async fn test_create_cluster_info_generates_secret() {
        let (context, store) = test_context();

        let info = create_cluster_info(&context, None).await.unwrap();
        assert_ne!(info.fsid, "");
        assert_eq!(info.admin_secret, "adminsecret");
        assert_eq!(info.name, "rookcluster");

        assert_eq!(store.value(FSID_KEY), Some(info.fsid.clone()));
        assert_eq!(store.value(ADMIN_SECRET_KEY).as_deref(), Some("adminsecret"));
    }

    #[tokio::test]
    async fn test_create_cluster_info_explicit_secret() {
        let (context, _store) = test_context();

        let info = create_cluster_info(&context, Some("mysupersecret"))
            .await
            .unwrap();
        assert_ne!(info.fsid, "");
        assert_eq!(info.admin_secret, "mysupersecret");
    }

    #[tokio::test]
    async fn test_create_cluster_info_is_idempotent() {
        let (context, _store) = test_context();

        let first = create_cluster_info(&context, None).await.unwrap();
        let second = create_cluster_info(&context, Some("mysupersecret"))
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(second.admin_secret, "adminsecret");
    }

    #[tokio::test]
    async fn test_create_cluster_info_generation_failure() {
        let store = Arc::new(MemoryStore::new());
        let context = Context::new(store.clone(), Arc::new(MockExecutor::failing("boom")));

        let err = create_cluster_info(&context, None).await.unwrap_err();
        assert!(matches!(err, LeaderError::IdentityGeneration(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_partial_identity_is_recreated() {
        let (context, store) = test_context();
        // Secrets written but the fsid never landed.
        store.set(ADMIN_SECRET_KEY, "stale").await.unwrap();

        assert!(load_cluster_info(&context).await.unwrap().is_none());
        let info = create_cluster_info(&context, None).await.unwrap();
        assert_eq!(info.admin_secret, "adminsecret");
        assert_eq!(store.value(ADMIN_SECRET_KEY).as_deref(), Some("adminsecret"));
    }
}
