use log::{info, error};
use std::sync::Arc;
use tokio::sync::RwLock;

mod core;
mod instances;
mod web;

use crate::core::component::ComponentConfig;
use crate::core::config::AppConfig;
use crate::core::orchestrator::Orchestrator;
use crate::instances::{IntelligentCacheInstance, ResourceSchedulerInstance};
use crate::web::server::{start_web_server, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting Granger hub...");

    let config = AppConfig::load().map_err(|e| {
        error!("Invalid configuration: {}", e);
        e
    })?;

    // Create the core orchestrator
    let orchestrator = Arc::new(RwLock::new(Orchestrator::new(config.orchestrator.clone())));
    info!("Core Orchestrator initialized");

    // Create component instances
    let scheduler = Arc::new(RwLock::new(ResourceSchedulerInstance::new()));
    let cache = Arc::new(RwLock::new(IntelligentCacheInstance::new()?));

    // Register, configure and start instances
    {
        let mut orch = orchestrator.write().await;
        orch.register_instance("resource_scheduler", scheduler.clone());
        orch.register_instance("intelligent_cache", cache.clone());

        orch.initialize_instance("resource_scheduler", ComponentConfig {
            id: "resource_scheduler".to_string(),
            name: "Resource Scheduler".to_string(),
            parameters: serde_json::to_value(&config.scheduler)?,
        }).await?;
        orch.initialize_instance("intelligent_cache", ComponentConfig {
            id: "intelligent_cache".to_string(),
            name: "Intelligent Cache".to_string(),
            parameters: serde_json::to_value(&config.cache)?,
        }).await?;

        orch.start_all().await?;
    }
    info!("All component instances registered and started");

    // Start the web interface
    let app_state = actix_web::web::Data::new(AppState::new(orchestrator.clone(), scheduler, cache).await);
    let server = start_web_server(app_state, &config.server)?;
    let server_handle = server.handle();
    let web_server_task = tokio::spawn(server);

    info!("Granger hub is now running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down Granger hub...");
    server_handle.stop(true).await;
    if let Err(e) = web_server_task.await {
        error!("Error during web server shutdown: {:?}", e);
    }

    if let Err(e) = orchestrator.write().await.stop_all().await {
        error!("Error stopping components: {}", e);
    }

    info!("Granger hub shutdown complete");
    Ok(())
}
