pub mod system;
pub mod orchestrator;
pub mod scheduler;
pub mod cache;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use actix_web::web;
    use tokio::sync::RwLock;

    use crate::core::orchestrator::Orchestrator;
    use crate::instances::{IntelligentCacheInstance, ResourceSchedulerInstance};
    use crate::web::server::AppState;

    /// App state over fresh, registered components
    pub async fn app_state() -> web::Data<AppState> {
        let scheduler = Arc::new(RwLock::new(ResourceSchedulerInstance::new()));
        let cache = Arc::new(RwLock::new(IntelligentCacheInstance::new().unwrap()));

        let mut orchestrator = Orchestrator::default();
        orchestrator.register_instance("resource_scheduler", scheduler.clone());
        orchestrator.register_instance("intelligent_cache", cache.clone());

        web::Data::new(AppState::new(Arc::new(RwLock::new(orchestrator)), scheduler, cache).await)
    }
}
