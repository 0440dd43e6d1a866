use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{info, error, debug};
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use serde::{Serialize, Deserialize};
use std::time::Duration;

use crate::core::component::{Component, ComponentMetrics, ComponentError};

lazy_static! {
    pub static ref CACHE_HITS: IntCounterVec = register_int_counter_vec!(
        "granger_cache_hits_total", "Cache hits by tier", &["tier"]
    ).expect("cache hit counter registers once");
    pub static ref CACHE_MISSES: IntCounter = register_int_counter!(
        "granger_cache_misses_total", "Cache lookups that found nothing"
    ).expect("cache miss counter registers once");
    pub static ref CACHE_EVICTIONS: IntCounterVec = register_int_counter_vec!(
        "granger_cache_evictions_total", "Entries dropped from the cache, by the tier that dropped them", &["tier"]
    ).expect("cache eviction counter registers once");
    pub static ref JOBS_SUBMITTED: IntCounter = register_int_counter!(
        "granger_jobs_submitted_total", "Jobs accepted by the scheduler"
    ).expect("job submission counter registers once");
    pub static ref JOBS_FINISHED: IntCounterVec = register_int_counter_vec!(
        "granger_jobs_finished_total", "Jobs reaching a terminal state", &["status"]
    ).expect("job finish counter registers once");
    pub static ref QUEUE_DEPTH: IntGauge = register_int_gauge!(
        "granger_scheduler_queue_depth", "Pending jobs"
    ).expect("queue depth gauge registers once");
    pub static ref RUNNING_JOBS: IntGauge = register_int_gauge!(
        "granger_scheduler_running_jobs", "Jobs currently placed on a node"
    ).expect("running jobs gauge registers once");
}

/// Render every registered Prometheus metric in the text exposition format
pub fn render_prometheus() -> Result<String, ComponentError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| ComponentError::ProcessingError(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| ComponentError::SerializationError(format!("Metrics are not UTF-8: {}", e)))
}

/// Manager for collecting and storing metrics from all components
#[derive(Debug)]
pub struct MetricsManager {
    /// Historical metrics data
    metrics_history: Arc<Mutex<HashMap<String, Vec<ComponentMetrics>>>>,
    /// Most recent metrics for each component
    latest_metrics: Arc<RwLock<HashMap<String, ComponentMetrics>>>,
    /// Configuration for metrics collection
    config: MetricsConfig,
}

/// Configuration for metrics collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Collection interval in seconds
    pub collection_interval_secs: u64,
    /// Maximum history to keep per component
    pub max_history_per_component: usize,
}

/// Summary metrics for the entire system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetricsSummary {
    /// Timestamp of the summary
    pub timestamp: DateTime<Utc>,
    /// Average task processing time (ms)
    pub avg_processing_time: f64,
    /// Total tasks processed
    pub total_tasks_processed: u64,
    /// Total tasks failed
    pub total_tasks_failed: u64,
    /// Latest metrics per component
    pub components: HashMap<String, ComponentMetrics>,
}

impl MetricsManager {
    /// Create a new metrics manager with the specified configuration
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            metrics_history: Arc::new(Mutex::new(HashMap::new())),
            latest_metrics: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Store one sample for a component, trimming its history
    pub async fn record(&self, component_id: &str, metrics: ComponentMetrics) {
        Self::store_sample(
            &self.metrics_history,
            &self.latest_metrics,
            self.config.max_history_per_component,
            component_id,
            metrics,
        ).await;
    }

    async fn store_sample(
        metrics_history: &Mutex<HashMap<String, Vec<ComponentMetrics>>>,
        latest_metrics: &RwLock<HashMap<String, ComponentMetrics>>,
        max_history: usize,
        component_id: &str,
        metrics: ComponentMetrics,
    ) {
        latest_metrics.write().await.insert(component_id.to_string(), metrics.clone());

        let mut history = metrics_history.lock().await;
        let component_history = history.entry(component_id.to_string()).or_insert_with(Vec::new);
        component_history.push(metrics);

        if component_history.len() > max_history {
            let excess = component_history.len() - max_history;
            component_history.drain(0..excess);
        }
    }

    /// Collect one round of metrics from every component
    pub async fn collect_once(&self, components: &HashMap<String, Arc<RwLock<dyn Component>>>) {
        for (component_id, component) in components {
            match component.read().await.collect_metrics().await {
                Ok(metrics) => self.record(component_id, metrics).await,
                Err(e) => error!("Failed to collect metrics from {}: {}", component_id, e),
            }
        }
    }

    /// Start the periodic collection loop; it ends when `shutdown` flips to true
    pub fn start_collection(
        &self,
        components: HashMap<String, Arc<RwLock<dyn Component>>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        info!("Starting metrics collection every {}s", self.config.collection_interval_secs);

        let metrics_history = self.metrics_history.clone();
        let latest_metrics = self.latest_metrics.clone();
        let period = Duration::from_secs(self.config.collection_interval_secs.max(1));
        let max_history = self.config.max_history_per_component;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!("Collecting metrics from all components");
                        for (component_id, component) in &components {
                            match component.read().await.collect_metrics().await {
                                Ok(metrics) => {
                                    Self::store_sample(&metrics_history, &latest_metrics, max_history, component_id, metrics).await;
                                }
                                Err(e) => error!("Failed to collect metrics from {}: {}", component_id, e),
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Metrics collection stopped");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Get the latest metrics for a specific component
    pub async fn get_latest_component_metrics(&self, component_id: &str) -> Option<ComponentMetrics> {
        self.latest_metrics.read().await.get(component_id).cloned()
    }

    /// Get historical metrics for a specific component, newest last
    pub async fn get_component_history(
        &self,
        component_id: &str,
        limit: Option<usize>,
    ) -> Vec<ComponentMetrics> {
        let history = self.metrics_history.lock().await;

        match history.get(component_id) {
            Some(component_history) => {
                let limit = limit.unwrap_or(component_history.len());
                let skip = component_history.len().saturating_sub(limit);
                component_history.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Get a system-wide metrics summary
    pub async fn get_system_summary(&self) -> SystemMetricsSummary {
        let latest = self.latest_metrics.read().await;

        let samples = latest.len();
        let total_processing_time: f64 = latest.values().map(|m| m.avg_processing_time).sum();

        SystemMetricsSummary {
            timestamp: Utc::now(),
            avg_processing_time: if samples > 0 {
                total_processing_time / samples as f64
            } else {
                0.0
            },
            total_tasks_processed: latest.values().map(|m| m.tasks_processed).sum(),
            total_tasks_failed: latest.values().map(|m| m.tasks_failed).sum(),
            components: latest.clone(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            collection_interval_secs: 10,
            max_history_per_component: 1000,
        }
    }
}
