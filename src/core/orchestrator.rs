use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use futures::future::join_all;
use log::{info, warn, error};
use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

use crate::core::component::{
    Component, ComponentStatus, ComponentTask, ComponentError, ComponentConfig
};
use crate::core::metrics::{MetricsConfig, MetricsManager};

/// The orchestrator owns every registered component, drives their
/// lifecycle together and routes tasks to them by id.
#[derive(Debug)]
pub struct Orchestrator {
    /// Map of component instances by their ID
    instances: HashMap<String, Arc<RwLock<dyn Component>>>,
    /// Orchestrator configuration
    config: OrchestratorConfig,
    /// Current system status
    status: SystemStatus,
    /// Component metrics history
    metrics: Arc<MetricsManager>,
    /// Stops the metrics collection loop
    metrics_shutdown: Option<watch::Sender<bool>>,
    metrics_task: Option<JoinHandle<()>>,
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Metrics collection interval in seconds
    pub metrics_interval_secs: u64,
    /// Samples kept per component
    pub max_metrics_history: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            metrics_interval_secs: 10,
            max_metrics_history: 1000,
        }
    }
}

/// Overall system status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Current orchestrator state
    pub state: OrchestratorState,
    /// When `start_all` last succeeded
    pub started_at: Option<DateTime<Utc>>,
    /// Last state update time
    pub last_updated: DateTime<Utc>,
    /// Registered component count
    pub registered_components: usize,
    /// Error messages if any
    pub errors: Vec<String>,
}

/// Orchestrator operational states
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OrchestratorState {
    /// Components registered but not started
    Initializing,
    /// All components started
    Running,
    /// Components are being stopped
    ShuttingDown,
    /// All components stopped
    Stopped,
    /// A lifecycle step failed
    Error,
}

/// One line of the component listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub id: String,
    pub component_type: String,
    pub status: ComponentStatus,
    pub info: serde_json::Value,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(config: OrchestratorConfig) -> Self {
        let metrics = MetricsManager::new(MetricsConfig {
            collection_interval_secs: config.metrics_interval_secs,
            max_history_per_component: config.max_metrics_history,
        });

        Self {
            instances: HashMap::new(),
            config,
            status: SystemStatus {
                state: OrchestratorState::Initializing,
                started_at: None,
                last_updated: Utc::now(),
                registered_components: 0,
                errors: Vec::new(),
            },
            metrics: Arc::new(metrics),
            metrics_shutdown: None,
            metrics_task: None,
        }
    }

    /// Register a component instance with the orchestrator
    pub fn register_instance(&mut self, id: &str, instance: Arc<RwLock<dyn Component>>) {
        if self.instances.contains_key(id) {
            warn!("Replacing existing instance with ID: {}", id);
        }
        self.instances.insert(id.to_string(), instance);
        self.status.registered_components = self.instances.len();
        info!("Registered component: {}", id);
    }

    /// Remove a component instance from the orchestrator
    pub fn unregister_instance(&mut self, id: &str) -> bool {
        let result = self.instances.remove(id).is_some();
        if result {
            self.status.registered_components = self.instances.len();
            info!("Unregistered component: {}", id);
        } else {
            warn!("Attempted to unregister non-existent component: {}", id);
        }
        result
    }

    /// Get a reference to a component instance by ID
    pub fn get_instance(&self, id: &str) -> Option<&Arc<RwLock<dyn Component>>> {
        self.instances.get(id)
    }

    /// Initialize one registered component
    pub async fn initialize_instance(&self, id: &str, config: ComponentConfig) -> Result<(), ComponentError> {
        let instance = self.instances
            .get(id)
            .ok_or_else(|| ComponentError::NotFound(format!("Component {}", id)))?;

        instance.write().await.initialize(config).await
    }

    /// Start all component instances and the metrics loop
    pub async fn start_all(&mut self) -> Result<(), ComponentError> {
        info!("Starting all component instances...");

        for (id, instance) in &self.instances {
            let mut component = instance.write().await;
            let result = match component.status() {
                ComponentStatus::Running => continue,
                ComponentStatus::Paused => component.resume().await,
                _ => component.start().await,
            };

            match result {
                Ok(_) => info!("Started component: {}", id),
                Err(e) => {
                    error!("Failed to start component {}: {}", id, e);
                    self.status.errors.push(format!("Failed to start {}: {}", id, e));
                    self.status.state = OrchestratorState::Error;
                    self.status.last_updated = Utc::now();
                    return Err(e);
                }
            }
        }

        if self.metrics_shutdown.is_none() {
            info!(
                "Collecting component metrics every {}s (history {})",
                self.config.metrics_interval_secs, self.config.max_metrics_history
            );
            let (tx, rx) = watch::channel(false);
            self.metrics_task = Some(self.metrics.start_collection(self.instances.clone(), rx));
            self.metrics_shutdown = Some(tx);
        }

        self.status.state = OrchestratorState::Running;
        self.status.started_at = Some(Utc::now());
        self.status.last_updated = Utc::now();
        Ok(())
    }

    /// Stop all component instances and the metrics loop
    ///
    /// Every component is asked to shut down even if an earlier one fails;
    /// the first error is returned.
    pub async fn stop_all(&mut self) -> Result<(), ComponentError> {
        info!("Stopping all component instances...");
        self.status.state = OrchestratorState::ShuttingDown;
        self.status.last_updated = Utc::now();

        if let Some(tx) = self.metrics_shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.metrics_task.take() {
            if let Err(e) = handle.await {
                warn!("Metrics collection task ended abnormally: {}", e);
            }
        }

        let mut first_error = None;
        for (id, instance) in &self.instances {
            match instance.write().await.shutdown().await {
                Ok(_) => info!("Stopped component: {}", id),
                Err(e) => {
                    error!("Failed to stop component {}: {}", id, e);
                    self.status.errors.push(format!("Failed to stop {}: {}", id, e));
                    first_error.get_or_insert(e);
                }
            }
        }

        self.status.last_updated = Utc::now();
        match first_error {
            Some(e) => {
                self.status.state = OrchestratorState::Error;
                Err(e)
            }
            None => {
                self.status.state = OrchestratorState::Stopped;
                Ok(())
            }
        }
    }

    /// Submit a task to be processed by a specific component
    pub async fn submit_task(&self, component_id: &str, task: ComponentTask) -> Result<serde_json::Value, ComponentError> {
        let instance = self.instances
            .get(component_id)
            .ok_or_else(|| ComponentError::NotFound(format!("Component {}", component_id)))?;

        let result = instance.write().await.process_task(task).await?;
        Ok(result)
    }

    /// Get the current system status
    pub fn get_status(&self) -> &SystemStatus {
        &self.status
    }

    /// Id, type, status and info of every component, sorted by id
    pub async fn component_summaries(&self) -> Vec<ComponentSummary> {
        let mut summaries = join_all(self.instances.iter().map(|(id, instance)| async move {
            let component = instance.read().await;
            ComponentSummary {
                id: id.clone(),
                component_type: component.component_type().to_string(),
                status: component.status(),
                info: component.get_info(),
            }
        }))
        .await;
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        summaries
    }

    /// Metrics history shared with the collection loop
    pub fn metrics(&self) -> Arc<MetricsManager> {
        self.metrics.clone()
    }

    /// Collect one round of metrics immediately
    pub async fn collect_metrics_now(&self) {
        self.metrics.collect_once(&self.instances).await;
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

// Tests for the Orchestrator
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::instances::{IntelligentCacheInstance, ResourceSchedulerInstance};

    fn orchestrator_with_components() -> Orchestrator {
        let mut orchestrator = Orchestrator::default();
        orchestrator.register_instance("resource_scheduler", Arc::new(RwLock::new(ResourceSchedulerInstance::new())));
        orchestrator.register_instance("intelligent_cache", Arc::new(RwLock::new(IntelligentCacheInstance::new().unwrap())));
        orchestrator
    }

    #[test]
    fn test_new_orchestrator() {
        let orchestrator = Orchestrator::default();
        assert_eq!(orchestrator.status.state, OrchestratorState::Initializing);
        assert_eq!(orchestrator.instances.len(), 0);
    }

    #[test]
    fn test_register_and_unregister() {
        let mut orchestrator = orchestrator_with_components();
        assert_eq!(orchestrator.get_status().registered_components, 2);
        assert!(orchestrator.get_instance("resource_scheduler").is_some());
        assert!(orchestrator.unregister_instance("intelligent_cache"));
        assert!(!orchestrator.unregister_instance("intelligent_cache"));
        assert_eq!(orchestrator.get_status().registered_components, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_and_task_routing() {
        let mut orchestrator = orchestrator_with_components();
        orchestrator.start_all().await.unwrap();
        assert_eq!(orchestrator.get_status().state, OrchestratorState::Running);

        // Starting again leaves running components alone
        orchestrator.start_all().await.unwrap();

        let summaries = orchestrator.component_summaries().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, "intelligent_cache");
        assert!(summaries.iter().all(|s| s.status == ComponentStatus::Running));

        let result = orchestrator
            .submit_task("intelligent_cache", ComponentTask::new("set", json!({"key": "k", "value": 1})))
            .await
            .unwrap();
        assert_eq!(result["success"], json!(true));

        let err = orchestrator
            .submit_task("missing", ComponentTask::new("stats", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::NotFound(_)));

        orchestrator.collect_metrics_now().await;
        let latest = orchestrator.metrics().get_latest_component_metrics("intelligent_cache").await.unwrap();
        assert_eq!(latest.tasks_processed, 1);

        orchestrator.stop_all().await.unwrap();
        assert_eq!(orchestrator.get_status().state, OrchestratorState::Stopped);
    }

    #[tokio::test]
    async fn test_initialize_unknown_component() {
        let orchestrator = Orchestrator::default();
        let config = ComponentConfig {
            id: "nope".to_string(),
            name: "nope".to_string(),
            parameters: serde_json::Value::Null,
        };
        assert!(matches!(
            orchestrator.initialize_instance("nope", config).await,
            Err(ComponentError::NotFound(_))
        ));
    }
}
