use std::any::Any;
use std::error::Error;
use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Represents the current status of a component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ComponentStatus {
    /// Component is initialized but not yet started
    Initialized,
    /// Component is running and operational
    Running,
    /// Component is paused but can be resumed
    Paused,
    /// Component is in the process of shutting down
    ShuttingDown,
    /// Component has been shut down
    Stopped,
    /// Component has encountered an error
    Error(String),
}

impl Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentStatus::Initialized => write!(f, "Initialized"),
            ComponentStatus::Running => write!(f, "Running"),
            ComponentStatus::Paused => write!(f, "Paused"),
            ComponentStatus::ShuttingDown => write!(f, "Shutting Down"),
            ComponentStatus::Stopped => write!(f, "Stopped"),
            ComponentStatus::Error(err) => write!(f, "Error: {}", err),
        }
    }
}

/// Metric data collected from components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentMetrics {
    /// Timestamp when metrics were collected
    pub timestamp: DateTime<Utc>,
    /// Number of tasks processed since the component started
    pub tasks_processed: u64,
    /// Number of tasks that failed
    pub tasks_failed: u64,
    /// Average task processing time in milliseconds
    pub avg_processing_time: f64,
    /// Component-specific metrics as key-value pairs
    pub custom_metrics: serde_json::Value,
}

/// Error type for component operations
#[derive(Debug)]
pub enum ComponentError {
    /// Error during initialization
    InitializationError(String),
    /// Error during task processing
    ProcessingError(String),
    /// Error in the persistence layer
    PersistenceError(String),
    /// Validation error
    ValidationError(String),
    /// Resource allocation error
    ResourceError(String),
    /// Requested entity does not exist
    NotFound(String),
    /// Component or entity not in the expected state
    InvalidStateError(String),
    /// Failure encoding or decoding a payload
    SerializationError(String),
}

impl Display for ComponentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentError::InitializationError(msg) => write!(f, "Initialization error: {}", msg),
            ComponentError::ProcessingError(msg) => write!(f, "Processing error: {}", msg),
            ComponentError::PersistenceError(msg) => write!(f, "Persistence error: {}", msg),
            ComponentError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ComponentError::ResourceError(msg) => write!(f, "Resource error: {}", msg),
            ComponentError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ComponentError::InvalidStateError(msg) => write!(f, "Invalid state: {}", msg),
            ComponentError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl Error for ComponentError {}

impl From<rusqlite::Error> for ComponentError {
    fn from(err: rusqlite::Error) -> Self {
        ComponentError::PersistenceError(err.to_string())
    }
}

impl From<serde_json::Error> for ComponentError {
    fn from(err: serde_json::Error) -> Self {
        ComponentError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for ComponentError {
    fn from(err: std::io::Error) -> Self {
        ComponentError::PersistenceError(err.to_string())
    }
}

/// Task assignment for components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentTask {
    /// Unique identifier for the task
    pub id: String,
    /// Operation name understood by the target component
    pub operation: String,
    /// Task parameters as JSON
    pub parameters: serde_json::Value,
    /// Task creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ComponentTask {
    /// Build a task with a fresh id
    pub fn new(operation: &str, parameters: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.to_string(),
            parameters,
            created_at: Utc::now(),
        }
    }
}

/// Component configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Component identifier
    pub id: String,
    /// Component display name
    pub name: String,
    /// Configuration parameters as JSON
    pub parameters: serde_json::Value,
}

/// Core trait for all hub components
#[async_trait]
pub trait Component: Send + Sync + Debug {
    /// Returns the component identifier
    fn id(&self) -> &str;

    /// Returns the component type name
    fn component_type(&self) -> &str;

    /// Returns the current status of the component
    fn status(&self) -> ComponentStatus;

    /// Initialize the component with the given configuration
    async fn initialize(&mut self, config: ComponentConfig) -> Result<(), ComponentError>;

    /// Start the component
    async fn start(&mut self) -> Result<(), ComponentError>;

    /// Pause the component
    async fn pause(&mut self) -> Result<(), ComponentError>;

    /// Resume the component after being paused
    async fn resume(&mut self) -> Result<(), ComponentError>;

    /// Shut down the component
    async fn shutdown(&mut self) -> Result<(), ComponentError>;

    /// Process a task
    async fn process_task(&mut self, task: ComponentTask) -> Result<serde_json::Value, ComponentError>;

    /// Collect metrics from the component
    async fn collect_metrics(&self) -> Result<ComponentMetrics, ComponentError>;

    /// Export the current state of the component (for persistence)
    async fn export_state(&self) -> Result<serde_json::Value, ComponentError>;

    /// Import a previously exported state
    async fn import_state(&mut self, state: serde_json::Value) -> Result<(), ComponentError>;

    /// Get component-specific information
    fn get_info(&self) -> serde_json::Value;

    /// Convert to Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Convert to mutable Any for downcasting
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ComponentError::NotFound("job abc".to_string());
        assert_eq!(err.to_string(), "Not found: job abc");
    }

    #[test]
    fn test_error_from_serde() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: ComponentError = parse.unwrap_err().into();
        assert!(matches!(err, ComponentError::SerializationError(_)));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ComponentStatus::ShuttingDown.to_string(), "Shutting Down");
        assert_eq!(ComponentStatus::Error("boom".into()).to_string(), "Error: boom");
    }
}
