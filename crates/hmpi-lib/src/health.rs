//! Liveness and readiness tracking for the analysis pipeline
//!
//! Each pipeline stage reports into a shared [`HealthRegistry`]. The overall
//! status is the worst component status; readiness additionally requires the
//! service to have finished wiring itself up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Pipeline stages that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    IndexEngine,
    Classifier,
    SampleStore,
    JobRegistry,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::IndexEngine,
        Component::Classifier,
        Component::SampleStore,
        Component::JobRegistry,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Component::IndexEngine => "index_engine",
            Component::Classifier => "classifier",
            Component::SampleStore => "sample_store",
            Component::JobRegistry => "job_registry",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Serving, but with reduced fidelity (e.g. fallback classifier)
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        *self != ComponentStatus::Unhealthy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

impl HealthResponse {
    fn from_components(components: BTreeMap<Component, ComponentHealth>) -> Self {
        // Variant order is Healthy < Degraded < Unhealthy
        let status = components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        Self { status, components }
    }

    /// Components that are not fully healthy
    pub fn impaired(&self) -> Vec<Component> {
        self.components
            .iter()
            .filter(|(_, h)| h.status != ComponentStatus::Healthy)
            .map(|(c, _)| *c)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<Component, ComponentHealth>,
    initialized: bool,
}

/// Shared, cloneable view of pipeline health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every pipeline component as healthy
    pub async fn register_all(&self) {
        for component in Component::ALL {
            self.register(component).await;
        }
    }

    pub async fn register(&self, component: Component) {
        self.set(component, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    async fn set(&self, component: Component, status: ComponentStatus, message: Option<String>) {
        self.state
            .write()
            .await
            .components
            .insert(component, ComponentHealth::new(status, message));
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.initialized = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        HealthResponse::from_components(self.state.read().await.components.clone())
    }

    /// Ready once initialized, as long as nothing is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if !state.initialized {
            Some("Service not yet initialized".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, h)| !h.status.is_operational())
                .map(|(c, _)| format!("{} is unhealthy", c))
        };

        ReadinessResponse {
            ready: reason.is_none(),
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

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("Service not yet initialized")
        );
    }

    #[tokio::test]
    async fn test_missing_model_degrades_service() {
        let registry = HealthRegistry::new();
        registry.register_all().await;
        registry
            .set_degraded(Component::Classifier, "No model loaded, using fallback")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.status.is_operational());
        assert_eq!(health.impaired(), vec![Component::Classifier]);
        assert_eq!(
            health.components[&Component::Classifier].message.as_deref(),
            Some("No model loaded, using fallback")
        );
    }

    #[tokio::test]
    async fn test_unhealthy_store_wins_over_degraded() {
        let registry = HealthRegistry::new();
        registry.register(Component::SampleStore).await;
        registry.set_degraded(Component::Classifier, "fallback").await;
        registry
            .set_unhealthy(Component::SampleStore, "unreachable")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert_eq!(
            health.impaired(),
            vec![Component::Classifier, Component::SampleStore]
        );
    }

    #[tokio::test]
    async fn test_readiness_follows_component_health() {
        let registry = HealthRegistry::new();
        registry.register(Component::JobRegistry).await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(Component::JobRegistry, "reaper stopped")
            .await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("job_registry is unhealthy"));
    }

    #[test]
    fn test_components_serialize_by_name() {
        let mut components = BTreeMap::new();
        components.insert(
            Component::IndexEngine,
            ComponentHealth::new(ComponentStatus::Healthy, None),
        );
        let json = serde_json::to_value(HealthResponse::from_components(components)).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["index_engine"]["status"], "healthy");
        assert!(json["components"]["index_engine"].get("message").is_none());
    }
}
