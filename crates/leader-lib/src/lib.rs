//! Cluster leader library for a Ceph storage cluster
//!
//! This crate provides the core functionality for:
//! - Cluster identity bootstrap
//! - Monitor quorum and OSD placement
//! - Desired-state publication to the distributed store
//! - Refresh dispatch and device change routing
//! - Health checks and observability

pub mod context;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod health;
pub mod identity;
pub mod inventory;
pub mod keys;
pub mod leader;
pub mod models;
pub mod observability;
pub mod placement;
pub mod service;
pub mod store;
pub mod writer;

pub use context::{Context, RefreshEvent};
pub use dispatch::{RefreshConfig, RefreshLoop, RefreshLoopBuilder};
pub use error::{LeaderError, Result};
pub use exec::{CommandExecutor, ProcessExecutor};
#[cfg(any(test, feature = "test-util"))]
pub use exec::MockExecutor;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inventory::{InventoryProvider, StaticInventory};
pub use leader::{Leader, LeaderPhase};
pub use models::*;
pub use observability::{LeaderMetrics, StructuredLogger};
pub use service::{Agent, Service, ServiceOptions, StoreConfig, StoreType};
pub use store::{KeyValueStore, MemoryStore, WatchAction, WatchEvent};
