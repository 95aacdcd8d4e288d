//! Health check infrastructure for the leader
//!
//! Tracks the leader, store and dispatcher components for liveness and readiness checks.
//! Readiness additionally requires the first reconciliation pass to have
//! converged.

use crate::models::ReconcileSummary;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status among the components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut status = ComponentStatus::Healthy;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => status = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }
        status
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const LEADER: &str = "leader";
    pub const STORE: &str = "store";
    pub const DISPATCHER: &str = "dispatcher";
}

/// Health registry for tracking component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    converged: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            converged: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components.write().await.insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Record whether the desired state has converged at least once
    pub async fn set_converged(&self, converged: bool) {
        *self.converged.write().await = converged;
    }

    /// Fold the outcome of a reconciliation pass into the leader component
    pub async fn record_pass(&self, outcome: Result<&ReconcileSummary, String>) {
        match outcome {
            Ok(summary) => {
                let failed = summary.failed_agents();
                if failed > 0 {
                    self.set_degraded(
                        components::LEADER,
                        format!("{} agent(s) reported failure", failed),
                    )
                    .await;
                } else {
                    self.set_healthy(components::LEADER).await;
                }
                self.set_converged(true).await;
            }
            Err(message) => {
                self.set_unhealthy(components::LEADER, message).await;
            }
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let converged = *self.converged.read().await;
        let health = self.health().await;

        if !converged {
            ReadinessResponse {
                ready: false,
                reason: Some("Desired state has not converged yet".to_string()),
            }
        } else if health.status == ComponentStatus::Unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentStatus, AgentStatusRecord, ServiceKind};

    #[tokio::test]
    async fn test_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_successful_pass_makes_ready() {
        let registry = HealthRegistry::new();
        registry.register(components::LEADER).await;

        registry.record_pass(Ok(&ReconcileSummary::default())).await;

        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert!(readiness.reason.is_none());
    }

    #[tokio::test]
    async fn test_failed_agents_degrade_leader() {
        let registry = HealthRegistry::new();
        registry.register(components::LEADER).await;

        let summary = ReconcileSummary {
            agent_statuses: vec![AgentStatusRecord {
                node_id: "a".to_string(),
                service: ServiceKind::Osd,
                status: AgentStatus::Failed,
            }],
            ..Default::default()
        };
        registry.record_pass(Ok(&summary)).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_failed_pass_is_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register(components::LEADER).await;
        registry.record_pass(Ok(&ReconcileSummary::default())).await;

        registry
            .record_pass(Err("store unavailable".to_string()))
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(!registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_health_response_serialization() {
        let registry = HealthRegistry::new();
        registry.register(components::STORE).await;
        registry
            .set_unhealthy(components::DISPATCHER, "watch failed")
            .await;

        let json = serde_json::to_value(registry.health().await).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["components"]["dispatcher"]["message"], "watch failed");
        assert!(json["components"]["store"].get("message").is_none());
    }
}
