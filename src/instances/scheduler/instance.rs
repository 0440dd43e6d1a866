//! Component wrapper for the Resource Scheduler
//!
//! `ResourceSchedulerInstance` owns the scheduler state behind one async
//! mutex, exposes the scheduling operations to the web layer and the
//! orchestrator, and drives the periodic scheduling loop while running.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use serde_json::json;
use tokio::sync::{watch, Mutex};

use crate::core::component::{
    Component, ComponentConfig, ComponentError, ComponentMetrics, ComponentStatus, ComponentTask,
};
use crate::instances::common::{
    extract_optional_param, extract_task_param, measure_execution_time, BaseComponent, EventType,
};

use super::executor::{JobExecutor, SimulatedExecutor};
use super::models::*;
use super::node::ResourceNode;
use super::queue::{SchedulerSnapshot, SchedulerState, TickReport};

/// Resource Scheduler component
///
/// Places jobs with multi-dimensional resource requirements onto simulated
/// nodes using one of several scheduling algorithms.
#[derive(Debug)]
pub struct ResourceSchedulerInstance {
    /// Base component functionality
    pub(crate) base: BaseComponent,
    /// Jobs, nodes and counters
    pub(crate) state: Arc<Mutex<SchedulerState>>,
    /// Stops the scheduling loop when set
    loop_shutdown: Option<watch::Sender<bool>>,
}

impl ResourceSchedulerInstance {
    /// Create a scheduler with the default configuration
    pub fn new() -> Self {
        let config = SchedulerConfig::default();
        let executor = Arc::new(SimulatedExecutor::new(config.failure_rate));

        Self {
            base: BaseComponent::new("resource_scheduler", "ResourceSchedulerInstance"),
            state: Arc::new(Mutex::new(SchedulerState::new(config, executor))),
            loop_shutdown: None,
        }
    }

    /// Replace the executor that decides job outcomes
    pub async fn set_executor(&self, executor: Arc<dyn JobExecutor>) {
        self.state.lock().await.set_executor(executor);
    }

    pub async fn submit_job(&self, request: JobRequest) -> Result<String, ComponentError> {
        let job_name = request.name.clone();
        let job_id = self.state.lock().await.submit_job(request, Utc::now())?;

        self.base.log_event(
            EventType::TaskProcessing,
            &format!("Job {} submitted", job_name),
            Some(json!({ "job_id": job_id })),
        ).await;

        Ok(job_id)
    }

    pub async fn cancel_job(&self, job_id: &str) -> Result<Job, ComponentError> {
        let job = self.state.lock().await.cancel_job(job_id, Utc::now())?;

        self.base.log_event(
            EventType::StateChange,
            &format!("Job {} cancelled", job.name),
            Some(json!({ "job_id": job.id })),
        ).await;

        Ok(job)
    }

    pub async fn complete_job(
        &self,
        job_id: &str,
        success: bool,
        reason: Option<String>,
    ) -> Result<Job, ComponentError> {
        self.state.lock().await.complete_job(job_id, success, reason, Utc::now())
    }

    /// Run one scheduling pass at the current time
    pub async fn tick(&self) -> Result<TickReport, ComponentError> {
        self.state.lock().await.tick_at(Utc::now())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job, ComponentError> {
        self.state
            .lock()
            .await
            .get_job(job_id)
            .ok_or_else(|| ComponentError::NotFound(format!("Job {}", job_id)))
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Vec<Job> {
        self.state.lock().await.list_jobs(status)
    }

    pub async fn queue_snapshot(&self) -> Vec<String> {
        self.state.lock().await.queue_snapshot()
    }

    pub async fn nodes(&self) -> Vec<ResourceNode> {
        self.state.lock().await.nodes().to_vec()
    }

    pub async fn add_node(&self, node: ResourceNode) -> Result<(), ComponentError> {
        let node_id = node.id.clone();
        self.state.lock().await.add_node(node)?;

        self.base.log_event(EventType::Resource, &format!("Node {} added", node_id), None).await;
        Ok(())
    }

    pub async fn remove_node(&self, node_id: &str) -> Result<ResourceNode, ComponentError> {
        let node = self.state.lock().await.remove_node(node_id)?;

        self.base.log_event(EventType::Resource, &format!("Node {} removed", node_id), None).await;
        Ok(node)
    }

    pub async fn set_node_online(&self, node_id: &str, online: bool) -> Result<(), ComponentError> {
        self.state.lock().await.set_node_online(node_id, online)?;

        self.base.log_event(
            EventType::Resource,
            &format!("Node {} marked {}", node_id, if online { "online" } else { "offline" }),
            None,
        ).await;
        Ok(())
    }

    pub async fn algorithm(&self) -> SchedulingAlgorithm {
        self.state.lock().await.algorithm()
    }

    pub async fn set_algorithm(&self, algorithm: SchedulingAlgorithm) {
        self.state.lock().await.set_algorithm(algorithm);

        self.base.log_event(
            EventType::ConfigChange,
            "Scheduling algorithm changed",
            Some(json!({ "algorithm": algorithm })),
        ).await;
    }

    pub async fn stats(&self) -> SchedulerStats {
        self.state.lock().await.stats()
    }

    fn spawn_tick_loop(&mut self, interval_ms: u64) {
        self.stop_tick_loop();

        let (tx, mut rx) = watch::channel(false);
        let state = self.state.clone();
        let component_id = self.base.id.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match state.lock().await.tick_at(Utc::now()) {
                            Ok(report) if !report.placed.is_empty() || !report.finished.is_empty() => {
                                debug!(
                                    "{}: placed {} job(s), finished {} job(s)",
                                    component_id, report.placed.len(), report.finished.len()
                                );
                            }
                            Ok(_) => {}
                            Err(e) => error!("{}: scheduling pass failed: {}", component_id, e),
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            debug!("{}: scheduling loop stopped", component_id);
                            break;
                        }
                    }
                }
            }
        });

        self.loop_shutdown = Some(tx);
    }

    fn stop_tick_loop(&mut self) {
        if let Some(tx) = self.loop_shutdown.take() {
            let _ = tx.send(true);
        }
    }

    async fn run_operation(&self, task: &ComponentTask) -> Result<serde_json::Value, ComponentError> {
        match task.operation.as_str() {
            "submit_job" => {
                let request: JobRequest = extract_task_param(task, "job")?;
                let job_id = self.submit_job(request).await?;
                Ok(json!({ "success": true, "job_id": job_id }))
            }
            "cancel_job" => {
                let job_id: String = extract_task_param(task, "job_id")?;
                let job = self.cancel_job(&job_id).await?;
                Ok(json!({ "success": true, "job": job }))
            }
            "complete_job" => {
                let job_id: String = extract_task_param(task, "job_id")?;
                let success = extract_optional_param::<bool>(task, "success")?.unwrap_or(true);
                let reason: Option<String> = extract_optional_param(task, "reason")?;
                let job = self.complete_job(&job_id, success, reason).await?;
                Ok(json!({ "success": true, "job": job }))
            }
            "tick" => {
                let report = self.tick().await?;
                Ok(serde_json::to_value(report)?)
            }
            "add_node" => {
                let node: ResourceNode = extract_task_param(task, "node")?;
                self.add_node(node).await?;
                Ok(json!({ "success": true }))
            }
            "remove_node" => {
                let node_id: String = extract_task_param(task, "node_id")?;
                let node = self.remove_node(&node_id).await?;
                Ok(json!({ "success": true, "node": node }))
            }
            "set_node_online" => {
                let node_id: String = extract_task_param(task, "node_id")?;
                let online: bool = extract_task_param(task, "online")?;
                self.set_node_online(&node_id, online).await?;
                Ok(json!({ "success": true }))
            }
            "set_algorithm" => {
                let name: String = extract_task_param(task, "algorithm")?;
                let algorithm: SchedulingAlgorithm = name.parse()?;
                self.set_algorithm(algorithm).await;
                Ok(json!({ "success": true, "algorithm": algorithm }))
            }
            "get_job" => {
                let job_id: String = extract_task_param(task, "job_id")?;
                Ok(serde_json::to_value(self.get_job(&job_id).await?)?)
            }
            "list_jobs" => {
                let status = extract_optional_param::<String>(task, "status")?
                    .map(|s| s.parse::<JobStatus>())
                    .transpose()?;
                Ok(serde_json::to_value(self.list_jobs(status).await)?)
            }
            "queue" => Ok(json!({ "queue": self.queue_snapshot().await })),
            "stats" => Ok(serde_json::to_value(self.stats().await)?),
            other => Err(ComponentError::ValidationError(format!(
                "Unknown scheduler operation: {}", other
            ))),
        }
    }
}

#[async_trait]
impl Component for ResourceSchedulerInstance {
    fn id(&self) -> &str {
        &self.base.id
    }

    fn component_type(&self) -> &str {
        &self.base.component_type
    }

    fn status(&self) -> ComponentStatus {
        self.base.status.clone()
    }

    async fn initialize(&mut self, config: ComponentConfig) -> Result<(), ComponentError> {
        info!("Initializing ResourceSchedulerInstance with config: {}", config.id);

        let scheduler_config: SchedulerConfig = if config.parameters.is_null() {
            SchedulerConfig::default()
        } else {
            serde_json::from_value(config.parameters.clone()).map_err(|e| {
                ComponentError::InitializationError(format!("Invalid scheduler configuration: {}", e))
            })?
        };
        scheduler_config.validate()?;

        let executor = Arc::new(SimulatedExecutor::new(scheduler_config.failure_rate));
        let node_count = scheduler_config.nodes.len();
        let algorithm = scheduler_config.algorithm;
        *self.state.lock().await = SchedulerState::new(scheduler_config, executor);

        self.base.config = Some(config);
        self.base.status = ComponentStatus::Initialized;
        self.base.log_event(
            EventType::Initialization,
            "ResourceSchedulerInstance initialized",
            Some(json!({ "nodes": node_count, "algorithm": algorithm })),
        ).await;

        Ok(())
    }

    async fn start(&mut self) -> Result<(), ComponentError> {
        self.base.require_status(&[ComponentStatus::Initialized, ComponentStatus::Stopped], "start")?;
        info!("Starting ResourceSchedulerInstance");

        let interval_ms = self.state.lock().await.config().tick_interval_ms;
        self.spawn_tick_loop(interval_ms);
        self.base.status = ComponentStatus::Running;

        self.base.log_event(
            EventType::StateChange,
            "ResourceSchedulerInstance started",
            Some(json!({ "tick_interval_ms": interval_ms })),
        ).await;

        Ok(())
    }

    async fn pause(&mut self) -> Result<(), ComponentError> {
        self.base.require_status(&[ComponentStatus::Running], "pause")?;
        info!("Pausing ResourceSchedulerInstance");

        self.stop_tick_loop();
        self.base.status = ComponentStatus::Paused;
        self.base.log_event(EventType::StateChange, "ResourceSchedulerInstance paused", None).await;

        Ok(())
    }

    async fn resume(&mut self) -> Result<(), ComponentError> {
        self.base.require_status(&[ComponentStatus::Paused], "resume")?;
        info!("Resuming ResourceSchedulerInstance");

        let interval_ms = self.state.lock().await.config().tick_interval_ms;
        self.spawn_tick_loop(interval_ms);
        self.base.status = ComponentStatus::Running;
        self.base.log_event(EventType::StateChange, "ResourceSchedulerInstance resumed", None).await;

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), ComponentError> {
        info!("Shutting down ResourceSchedulerInstance");
        self.base.status = ComponentStatus::ShuttingDown;

        self.stop_tick_loop();
        let pending = self.state.lock().await.pending_count();

        self.base.status = ComponentStatus::Stopped;
        self.base.log_event(
            EventType::StateChange,
            "ResourceSchedulerInstance stopped",
            Some(json!({ "pending_jobs": pending })),
        ).await;

        Ok(())
    }

    async fn process_task(&mut self, task: ComponentTask) -> Result<serde_json::Value, ComponentError> {
        debug!("Processing task {} ({})", task.id, task.operation);
        self.base.log_event(
            EventType::TaskProcessing,
            &format!("Processing task {}", task.id),
            Some(json!({ "operation": task.operation })),
        ).await;

        let (result, duration_ms) = measure_execution_time(self.run_operation(&task)).await;
        self.base.record_task_processing(result.is_ok(), duration_ms);
        self.base.set_custom_metric(&format!("last_{}_ms", task.operation), duration_ms);

        if let Err(e) = &result {
            self.base.log_event(
                EventType::Error,
                &format!("Task {} failed: {}", task.id, e),
                None,
            ).await;
        }

        result
    }

    async fn collect_metrics(&self) -> Result<ComponentMetrics, ComponentError> {
        let stats = self.state.lock().await.stats();

        Ok(self.base.get_metrics(json!({
            "algorithm": stats.algorithm,
            "queue_depth": stats.queue_depth,
            "running_jobs": stats.running,
            "total_submitted": stats.total_submitted,
            "avg_wait_secs": stats.avg_wait_secs,
            "avg_turnaround_secs": stats.avg_turnaround_secs,
            "total_cost": stats.total_cost,
        })))
    }

    async fn export_state(&self) -> Result<serde_json::Value, ComponentError> {
        let snapshot = self.state.lock().await.snapshot();

        Ok(json!({
            "scheduler": snapshot,
            "base": {
                "id": self.base.id,
                "component_type": self.base.component_type,
                "status": self.base.status.to_string(),
                "metrics": self.base.metrics,
            }
        }))
    }

    async fn import_state(&mut self, state: serde_json::Value) -> Result<(), ComponentError> {
        let snapshot_value = state
            .get("scheduler")
            .cloned()
            .ok_or_else(|| ComponentError::ValidationError("State has no 'scheduler' section".to_string()))?;
        let snapshot: SchedulerSnapshot = serde_json::from_value(snapshot_value)?;

        self.state.lock().await.restore(snapshot)?;
        self.base.log_event(EventType::StateChange, "Scheduler state imported", None).await;

        Ok(())
    }

    fn get_info(&self) -> serde_json::Value {
        let details = self.state.try_lock().ok().map(|state| json!({
            "algorithm": state.algorithm(),
            "nodes": state.nodes().len(),
            "pending_jobs": state.pending_count(),
            "running_jobs": state.running_count(),
        }));

        json!({
            "id": self.base.id,
            "type": self.base.component_type,
            "status": self.base.status.to_string(),
            "scheduler": details,
            "tasks_processed": self.base.metrics.tasks_processed,
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Default for ResourceSchedulerInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceSchedulerInstance {
    fn drop(&mut self) {
        self.stop_tick_loop();
    }
}
