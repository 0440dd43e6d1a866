//! Component wrapper for the Intelligent Cache

use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, Mutex};

use crate::core::component::{
    Component, ComponentConfig, ComponentError, ComponentMetrics, ComponentStatus, ComponentTask,
};
use crate::instances::common::{
    extract_optional_param, extract_task_param, measure_execution_time, BaseComponent, EventType,
};

use super::models::*;
use super::store::{TieredCache, WarmEntry};

/// Intelligent Cache component
///
/// A three-tier key/value cache (memory, SQLite disk, sharded distributed)
/// with pluggable eviction, TTLs, compression, and promotion of entries
/// that keep getting hit on the slower tiers.
#[derive(Debug)]
pub struct IntelligentCacheInstance {
    /// Base component functionality
    pub(crate) base: BaseComponent,
    /// Tiers, policy and counters
    pub(crate) cache: Arc<Mutex<TieredCache>>,
    /// Stops the expiry sweep when set
    loop_shutdown: Option<watch::Sender<bool>>,
}

impl IntelligentCacheInstance {
    /// Create a cache with the default configuration and an in-memory disk tier
    pub fn new() -> Result<Self, ComponentError> {
        Ok(Self {
            base: BaseComponent::new("intelligent_cache", "IntelligentCacheInstance"),
            cache: Arc::new(Mutex::new(TieredCache::new(CacheConfig::default())?)),
            loop_shutdown: None,
        })
    }

    pub async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl_secs: Option<u64>,
    ) -> Result<(), ComponentError> {
        self.cache.lock().await.set(key, &value, ttl_secs, Utc::now())
    }

    pub async fn set_typed<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: Option<u64>,
    ) -> Result<(), ComponentError> {
        self.set(key, serde_json::to_value(value)?, ttl_secs).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, ComponentError> {
        self.cache.lock().await.get(key, Utc::now())
    }

    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ComponentError> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Return the cached value, or compute, store and return it
    pub async fn get_or_insert_with<F, Fut>(
        &self,
        key: &str,
        ttl_secs: Option<u64>,
        compute: F,
    ) -> Result<serde_json::Value, ComponentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, ComponentError>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = compute().await?;
        self.set(key, value.clone(), ttl_secs).await?;
        Ok(value)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, ComponentError> {
        self.cache.lock().await.delete(key)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, ComponentError> {
        self.cache.lock().await.exists(key, Utc::now())
    }

    pub async fn tier_of(&self, key: &str) -> Result<Option<CacheTier>, ComponentError> {
        self.cache.lock().await.tier_of(key, Utc::now())
    }

    pub async fn clear(&self) -> Result<(), ComponentError> {
        self.cache.lock().await.clear()?;
        self.base.log_event(EventType::StateChange, "Cache cleared", None).await;
        Ok(())
    }

    pub async fn cleanup_expired(&self) -> Result<usize, ComponentError> {
        self.cache.lock().await.cleanup_expired(Utc::now())
    }

    pub async fn warm(&self, entries: Vec<WarmEntry>) -> Result<usize, ComponentError> {
        let written = self.cache.lock().await.warm(entries, Utc::now())?;
        self.base.log_event(
            EventType::Info,
            &format!("Cache warmed with {} entries", written),
            None,
        ).await;
        Ok(written)
    }

    pub async fn set_eviction_policy(&self, policy: EvictionPolicy) {
        self.cache.lock().await.set_eviction_policy(policy);
        self.base.log_event(
            EventType::ConfigChange,
            "Eviction policy changed",
            Some(json!({ "policy": policy })),
        ).await;
    }

    pub async fn update_adaptive_weights(&self, weights: AdaptiveWeights) -> Result<AdaptiveWeights, ComponentError> {
        let applied = self.cache.lock().await.update_adaptive_weights(weights)?;
        self.base.log_event(
            EventType::ConfigChange,
            "Adaptive eviction weights updated",
            Some(json!({ "weights": applied })),
        ).await;
        Ok(applied)
    }

    pub async fn set_distributed_node_online(&self, node: usize, online: bool) -> Result<(), ComponentError> {
        self.cache.lock().await.set_distributed_node_online(node, online)?;
        self.base.log_event(
            EventType::Resource,
            &format!("Distributed cache node {} marked {}", node, if online { "online" } else { "offline" }),
            None,
        ).await;
        Ok(())
    }

    pub async fn stats(&self) -> Result<CacheStats, ComponentError> {
        self.cache.lock().await.stats()
    }

    fn spawn_cleanup_loop(&mut self, interval_secs: u64) {
        self.stop_cleanup_loop();

        let (tx, mut rx) = watch::channel(false);
        let cache = self.cache.clone();
        let component_id = self.base.id.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match cache.lock().await.cleanup_expired(Utc::now()) {
                            Ok(0) => {}
                            Ok(removed) => debug!("{}: swept {} expired entries", component_id, removed),
                            Err(e) => error!("{}: expiry sweep failed: {}", component_id, e),
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            debug!("{}: expiry sweep stopped", component_id);
                            break;
                        }
                    }
                }
            }
        });

        self.loop_shutdown = Some(tx);
    }

    fn stop_cleanup_loop(&mut self) {
        if let Some(tx) = self.loop_shutdown.take() {
            let _ = tx.send(true);
        }
    }

    async fn run_operation(&self, task: &ComponentTask) -> Result<serde_json::Value, ComponentError> {
        match task.operation.as_str() {
            "set" => {
                let key: String = extract_task_param(task, "key")?;
                let value: serde_json::Value = extract_task_param(task, "value")?;
                let ttl_secs: Option<u64> = extract_optional_param(task, "ttl_secs")?;
                self.set(&key, value, ttl_secs).await?;
                Ok(json!({ "success": true, "key": key }))
            }
            "get" => {
                let key: String = extract_task_param(task, "key")?;
                let value = self.get(&key).await?;
                Ok(json!({ "key": key, "found": value.is_some(), "value": value }))
            }
            "delete" => {
                let key: String = extract_task_param(task, "key")?;
                Ok(json!({ "deleted": self.delete(&key).await? }))
            }
            "exists" => {
                let key: String = extract_task_param(task, "key")?;
                Ok(json!({ "exists": self.exists(&key).await? }))
            }
            "tier_of" => {
                let key: String = extract_task_param(task, "key")?;
                Ok(json!({ "tier": self.tier_of(&key).await? }))
            }
            "clear" => {
                self.clear().await?;
                Ok(json!({ "success": true }))
            }
            "cleanup" => Ok(json!({ "removed": self.cleanup_expired().await? })),
            "warm" => {
                let entries: Vec<WarmEntry> = extract_task_param(task, "entries")?;
                Ok(json!({ "written": self.warm(entries).await? }))
            }
            "set_policy" => {
                let name: String = extract_task_param(task, "policy")?;
                let policy: EvictionPolicy = name.parse()?;
                self.set_eviction_policy(policy).await;
                Ok(json!({ "success": true, "policy": policy }))
            }
            "update_weights" => {
                let weights: AdaptiveWeights = extract_task_param(task, "weights")?;
                Ok(json!({ "weights": self.update_adaptive_weights(weights).await? }))
            }
            "set_node_online" => {
                let node: usize = extract_task_param(task, "node")?;
                let online: bool = extract_task_param(task, "online")?;
                self.set_distributed_node_online(node, online).await?;
                Ok(json!({ "success": true }))
            }
            "stats" => Ok(serde_json::to_value(self.stats().await?)?),
            other => Err(ComponentError::ValidationError(format!(
                "Unknown cache operation: {}", other
            ))),
        }
    }
}

#[async_trait]
impl Component for IntelligentCacheInstance {
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
        info!("Initializing IntelligentCacheInstance with config: {}", config.id);

        let cache_config: CacheConfig = if config.parameters.is_null() {
            CacheConfig::default()
        } else {
            serde_json::from_value(config.parameters.clone()).map_err(|e| {
                ComponentError::InitializationError(format!("Invalid cache configuration: {}", e))
            })?
        };

        let policy = cache_config.eviction_policy;
        let memory_capacity = cache_config.memory_capacity;
        let persistent = cache_config.disk_path.is_some();
        *self.cache.lock().await = TieredCache::new(cache_config)?;

        self.base.config = Some(config);
        self.base.status = ComponentStatus::Initialized;
        self.base.log_event(
            EventType::Initialization,
            "IntelligentCacheInstance initialized",
            Some(json!({
                "eviction_policy": policy,
                "memory_capacity": memory_capacity,
                "persistent_disk_tier": persistent,
            })),
        ).await;

        Ok(())
    }

    async fn start(&mut self) -> Result<(), ComponentError> {
        self.base.require_status(&[ComponentStatus::Initialized, ComponentStatus::Stopped], "start")?;
        info!("Starting IntelligentCacheInstance");

        let interval_secs = self.cache.lock().await.config().cleanup_interval_secs;
        self.spawn_cleanup_loop(interval_secs);
        self.base.status = ComponentStatus::Running;
        self.base.log_event(EventType::StateChange, "IntelligentCacheInstance started", None).await;

        Ok(())
    }

    async fn pause(&mut self) -> Result<(), ComponentError> {
        self.base.require_status(&[ComponentStatus::Running], "pause")?;
        info!("Pausing IntelligentCacheInstance");

        self.stop_cleanup_loop();
        self.base.status = ComponentStatus::Paused;
        self.base.log_event(EventType::StateChange, "IntelligentCacheInstance paused", None).await;

        Ok(())
    }

    async fn resume(&mut self) -> Result<(), ComponentError> {
        self.base.require_status(&[ComponentStatus::Paused], "resume")?;
        info!("Resuming IntelligentCacheInstance");

        let interval_secs = self.cache.lock().await.config().cleanup_interval_secs;
        self.spawn_cleanup_loop(interval_secs);
        self.base.status = ComponentStatus::Running;
        self.base.log_event(EventType::StateChange, "IntelligentCacheInstance resumed", None).await;

        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), ComponentError> {
        info!("Shutting down IntelligentCacheInstance");
        self.base.status = ComponentStatus::ShuttingDown;
        self.stop_cleanup_loop();

        self.base.status = ComponentStatus::Stopped;
        self.base.log_event(EventType::StateChange, "IntelligentCacheInstance stopped", None).await;

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
            self.base.log_event(EventType::Error, &format!("Task {} failed: {}", task.id, e), None).await;
        }

        result
    }

    async fn collect_metrics(&self) -> Result<ComponentMetrics, ComponentError> {
        let stats = self.stats().await?;

        Ok(self.base.get_metrics(json!({
            "hit_rate": stats.hit_rate,
            "hits": stats.total_hits(),
            "misses": stats.misses,
            "evictions": stats.evictions,
            "promotions": stats.promotions,
            "demotions": stats.demotions,
            "memory_entries": stats.memory_entries,
            "disk_entries": stats.disk_entries,
            "distributed_entries": stats.distributed_entries,
            "memory_bytes": stats.memory_bytes,
        })))
    }

    async fn export_state(&self) -> Result<serde_json::Value, ComponentError> {
        let cache = self.cache.lock().await;

        Ok(json!({
            "config": cache.config(),
            "eviction_policy": cache.policy(),
            "adaptive_weights": cache.weights(),
            "stats": cache.stats()?,
            "base": {
                "id": self.base.id,
                "component_type": self.base.component_type,
                "status": self.base.status.to_string(),
                "metrics": self.base.metrics,
            }
        }))
    }

    async fn import_state(&mut self, state: serde_json::Value) -> Result<(), ComponentError> {
        let mut cache = self.cache.lock().await;

        if let Some(policy) = state.get("eviction_policy") {
            cache.set_eviction_policy(serde_json::from_value(policy.clone())?);
        }
        if let Some(weights) = state.get("adaptive_weights") {
            cache.update_adaptive_weights(serde_json::from_value(weights.clone())?)?;
        }
        drop(cache);

        self.base.log_event(EventType::StateChange, "Cache settings imported", None).await;
        Ok(())
    }

    fn get_info(&self) -> serde_json::Value {
        let details = self.cache.try_lock().ok().map(|cache| json!({
            "eviction_policy": cache.policy(),
            "memory_capacity": cache.config().memory_capacity,
            "distributed_nodes": cache.config().distributed_nodes,
        }));

        json!({
            "id": self.base.id,
            "type": self.base.component_type,
            "status": self.base.status.to_string(),
            "cache": details,
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

impl Drop for IntelligentCacheInstance {
    fn drop(&mut self) {
        self.stop_cleanup_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        visits: u32,
    }

    fn component_config(parameters: serde_json::Value) -> ComponentConfig {
        ComponentConfig {
            id: "intelligent_cache".to_string(),
            name: "Intelligent Cache".to_string(),
            parameters,
        }
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mut cache = IntelligentCacheInstance::new().unwrap();
        cache.initialize(component_config(json!({ "memory_capacity": 10 }))).await.unwrap();

        cache.start().await.unwrap();
        assert!(cache.start().await.is_err());
        cache.pause().await.unwrap();
        cache.resume().await.unwrap();
        cache.shutdown().await.unwrap();
        assert_eq!(cache.status(), ComponentStatus::Stopped);

        let err = cache
            .initialize(component_config(json!({ "memory_capacity": 0 })))
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_typed_access() {
        let cache = IntelligentCacheInstance::new().unwrap();
        let profile = Profile { name: "Ada".to_string(), visits: 3 };

        cache.set_typed("profile:ada", &profile, Some(300)).await.unwrap();
        let loaded: Option<Profile> = cache.get_typed("profile:ada").await.unwrap();
        assert_eq!(loaded, Some(profile));

        let wrong_shape = cache.get_typed::<Vec<u8>>("profile:ada").await;
        assert!(matches!(wrong_shape, Err(ComponentError::SerializationError(_))));
    }

    #[tokio::test]
    async fn test_get_or_insert_with_computes_once() {
        let cache = IntelligentCacheInstance::new().unwrap();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .get_or_insert_with("report", None, || async move {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(json!({ "rows": 42 }))
                })
                .await
                .unwrap();
            assert_eq!(value["rows"], json!(42));
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_operations_through_tasks() {
        let mut cache = IntelligentCacheInstance::new().unwrap();

        cache
            .process_task(ComponentTask::new("set", json!({ "key": "a", "value": [1, 2, 3] })))
            .await
            .unwrap();
        let got = cache.process_task(ComponentTask::new("get", json!({ "key": "a" }))).await.unwrap();
        assert_eq!(got["value"], json!([1, 2, 3]));

        let tier = cache.process_task(ComponentTask::new("tier_of", json!({ "key": "a" }))).await.unwrap();
        assert_eq!(tier["tier"], json!("memory"));

        let policy = cache
            .process_task(ComponentTask::new("set_policy", json!({ "policy": "adaptive" })))
            .await
            .unwrap();
        assert_eq!(policy["policy"], json!("adaptive"));

        let weights = cache
            .process_task(ComponentTask::new(
                "update_weights",
                json!({ "weights": { "recency": 0.5, "frequency": 0.5, "size": 0.0 } }),
            ))
            .await
            .unwrap();
        assert_eq!(weights["weights"]["size"], json!(0.0));

        let err = cache
            .process_task(ComponentTask::new("set_node_online", json!({ "node": 9, "online": false })))
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::NotFound(_)));

        let deleted = cache.process_task(ComponentTask::new("delete", json!({ "key": "a" }))).await.unwrap();
        assert_eq!(deleted["deleted"], json!(true));

        let metrics = cache.collect_metrics().await.unwrap();
        assert_eq!(metrics.tasks_processed, 6);
        assert_eq!(metrics.tasks_failed, 1);
        assert_eq!(metrics.custom_metrics["hits"], json!(1));
    }

    #[tokio::test]
    async fn test_settings_round_trip() {
        let source = IntelligentCacheInstance::new().unwrap();
        source.set_eviction_policy(EvictionPolicy::Fifo).await;
        let exported = source.export_state().await.unwrap();

        let mut target = IntelligentCacheInstance::new().unwrap();
        target.import_state(exported).await.unwrap();
        assert_eq!(target.stats().await.unwrap().eviction_policy, EvictionPolicy::Fifo);
    }
}
