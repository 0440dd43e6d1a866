//! Application configuration
//!
//! Built from defaults, an optional JSON file named by `GRANGER_CONFIG`,
//! and the `GRANGER_HOST` / `GRANGER_PORT` overrides.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::component::ComponentError;
use crate::core::orchestrator::OrchestratorConfig;
use crate::instances::cache::CacheConfig;
use crate::instances::scheduler::SchedulerConfig;

pub const CONFIG_ENV: &str = "GRANGER_CONFIG";
pub const HOST_ENV: &str = "GRANGER_HOST";
pub const PORT_ENV: &str = "GRANGER_PORT";

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Worker threads; actix picks one per core when unset
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self, ComponentError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` in place of the process environment
    pub fn load_with<F>(lookup: F) -> Result<Self, ComponentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) => {
                info!("Loading configuration from {}", path);
                Self::from_file(Path::new(&path))?
            }
            None => Self::default(),
        };

        if let Some(host) = lookup(HOST_ENV) {
            config.server.host = host;
        }
        if let Some(port) = lookup(PORT_ENV) {
            config.server.port = port.parse().map_err(|_| {
                ComponentError::ValidationError(format!("{} is not a valid port: {}", PORT_ENV, port))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file; missing sections keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ComponentError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<(), ComponentError> {
        if self.server.host.trim().is_empty() {
            return Err(ComponentError::ValidationError("server.host must not be empty".to_string()));
        }
        if self.server.workers == Some(0) {
            return Err(ComponentError::ValidationError("server.workers must be positive".to_string()));
        }
        if self.orchestrator.metrics_interval_secs == 0 {
            return Err(ComponentError::ValidationError(
                "orchestrator.metrics_interval_secs must be positive".to_string(),
            ));
        }
        self.scheduler.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}
