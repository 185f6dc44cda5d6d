//! Health tracking for the prediction service
//!
//! Components report their state here; the server exposes the aggregate on
//! `/healthz` and uses readiness to gate `/readyz`.

use crate::artifacts::ArtifactSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational, but some requests will fail (e.g. an artifact is missing)
    Degraded,
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

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }
        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const ARTIFACTS: &str = "artifacts";
    pub const PREPROCESSOR: &str = "preprocessor";
    pub const PREDICTOR: &str = "predictor";
}

#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
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
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
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

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Derive component health and readiness from the loaded artifacts.
    ///
    /// A missing scaler degrades the preprocessor, a missing model degrades
    /// the predictor; the service is ready only with both.
    pub async fn report_artifacts(&self, artifacts: &ArtifactSet) {
        let scaler_loaded = artifacts.scaler().is_some();
        let model_loaded = artifacts.model().is_some();

        if scaler_loaded {
            self.set_healthy(components::PREPROCESSOR).await;
        } else {
            self.set_degraded(components::PREPROCESSOR, "scaling transform not loaded").await;
        }
        if model_loaded {
            self.set_healthy(components::PREDICTOR).await;
        } else {
            self.set_degraded(components::PREDICTOR, "model not loaded").await;
        }
        if scaler_loaded && model_loaded {
            self.set_healthy(components::ARTIFACTS).await;
        } else {
            self.set_degraded(components::ARTIFACTS, "artifact set incomplete").await;
        }
        self.set_ready(scaler_loaded && model_loaded).await;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        let reason = if !ready {
            Some("Scaler and model not loaded".to_string())
        } else if health.status == ComponentStatus::Unhealthy {
            Some("Critical component unhealthy".to_string())
        } else {
            None
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
    use crate::models::feature_column_names;
    use crate::predictor::LogisticClassifier;
    use crate::preprocessor::ScalingTransform;

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_unhealthy_component_wins() {
        let registry = HealthRegistry::new();
        registry.register(components::PREPROCESSOR).await;
        registry.register(components::PREDICTOR).await;
        registry.set_degraded(components::PREPROCESSOR, "slow").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.set_unhealthy(components::PREDICTOR, "inference failing").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_not_ready_without_artifacts() {
        let registry = HealthRegistry::new();
        registry.report_artifacts(&ArtifactSet::default()).await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::PREDICTOR].message.as_deref(),
            Some("model not loaded")
        );
    }

    #[tokio::test]
    async fn test_ready_with_scaler_and_model() {
        let model = LogisticClassifier::new("m1", feature_column_names(), vec![0.0; 15], 0.0).unwrap();
        let artifacts = ArtifactSet::new(Some(ScalingTransform::identity("s1")), Some(Arc::new(model)));
        let registry = HealthRegistry::new();
        registry.report_artifacts(&artifacts).await;

        assert!(registry.readiness().await.ready);
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_when_unhealthy() {
        let registry = HealthRegistry::new();
        registry.register(components::PREDICTOR).await;
        registry.set_ready(true).await;
        registry.set_unhealthy(components::PREDICTOR, "Failed").await;
        assert!(!registry.readiness().await.ready);
    }
}
