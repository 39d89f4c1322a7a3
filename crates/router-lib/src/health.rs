//! Health check infrastructure for the router
//!
//! Tracks the sampler, the bootstrap orchestrator and each tool backend,
//! and reports readiness once an agent generation has been published.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is retrying or partially available
    Degraded,
    /// Component has failed and will not recover by itself
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components; an empty set is healthy
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .fold(ComponentStatus::Healthy, |worst, s| match (worst, s) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    /// Generation of the published agent, once there is one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const SAMPLER: &str = "sampler";
    pub const BOOTSTRAP: &str = "bootstrap";

    /// Per-backend component key, e.g. `backend:weather`
    pub fn backend(name: &str) -> String {
        format!("backend:{name}")
    }
}

/// Health registry shared by the router's components
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    published: Arc<RwLock<Option<u64>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
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

    /// Record that agent `generation` is now serving requests
    pub async fn mark_published(&self, generation: u64) {
        *self.published.write().await = Some(generation);
    }

    pub async fn published_generation(&self) -> Option<u64> {
        *self.published.read().await
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once an agent is published and nothing is unhealthy.
    /// Degraded backends keep the router ready: requests still reach the
    /// model and fail per request if a tool is down.
    pub async fn readiness(&self) -> ReadinessResponse {
        let generation = self.published_generation().await;
        let status = self.health().await.status;

        let reason = match (generation, status) {
            (None, _) => Some("Agent is still initializing".to_string()),
            (Some(_), ComponentStatus::Unhealthy) => {
                Some("Critical component unhealthy".to_string())
            }
            _ => None,
        };

        ReadinessResponse {
            ready: reason.is_none(),
            generation,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.generation, None);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Agent is still initializing")
        );
    }

    #[tokio::test]
    async fn test_worst_component_wins() {
        let registry = HealthRegistry::new();
        registry.register(components::SAMPLER).await;
        registry.register(components::BOOTSTRAP).await;

        registry
            .set_degraded(components::SAMPLER, "Utilization read failed")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(components::BOOTSTRAP, "GROQ_API_KEY not set")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_ready_after_publish() {
        let registry = HealthRegistry::new();
        registry.mark_published(3).await;

        let readiness = registry.readiness().await;
        assert!(readiness.ready);
        assert_eq!(readiness.generation, Some(3));
    }

    #[tokio::test]
    async fn test_degraded_backend_keeps_agent_ready() {
        let registry = HealthRegistry::new();
        registry.mark_published(1).await;
        registry
            .set_degraded(&components::backend("weather"), "not answering")
            .await;

        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.mark_published(1).await;
        registry.set_unhealthy(components::BOOTSTRAP, "Failed").await;

        assert!(!registry.readiness().await.ready);
    }

    #[test]
    fn test_operational_statuses() {
        assert!(ComponentStatus::Degraded.is_operational());
        assert!(!ComponentStatus::Unhealthy.is_operational());
    }
}
