use std::sync::Arc;
use tokio::sync::RwLock;
use actix_web::{dev::Server, web, App, HttpServer, middleware};
use log::info;

use crate::core::config::ServerConfig;
use crate::core::metrics::MetricsManager;
use crate::core::orchestrator::Orchestrator;
use crate::instances::{IntelligentCacheInstance, ResourceSchedulerInstance};
use crate::web::handlers;

/// Shared application state for web handlers
pub struct AppState {
    pub orchestrator: Arc<RwLock<Orchestrator>>,
    pub scheduler: Arc<RwLock<ResourceSchedulerInstance>>,
    pub cache: Arc<RwLock<IntelligentCacheInstance>>,
    pub metrics: Arc<MetricsManager>,
}

impl AppState {
    pub async fn new(
        orchestrator: Arc<RwLock<Orchestrator>>,
        scheduler: Arc<RwLock<ResourceSchedulerInstance>>,
        cache: Arc<RwLock<IntelligentCacheInstance>>,
    ) -> Self {
        let metrics = orchestrator.read().await.metrics();
        Self { orchestrator, scheduler, cache, metrics }
    }
}

/// Register every management route
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            // System APIs
            .route("/system/status", web::get().to(handlers::system::get_system_status))
            .route("/system/metrics", web::get().to(handlers::system::get_system_metrics))
            .route("/system/metrics/{component_id}", web::get().to(handlers::system::get_component_history))
            .route("/system/components", web::get().to(handlers::system::get_components))

            // Orchestrator APIs
            .route("/orchestrator/status", web::get().to(handlers::orchestrator::get_status))
            .route("/orchestrator/start", web::post().to(handlers::orchestrator::start_all))
            .route("/orchestrator/stop", web::post().to(handlers::orchestrator::stop_all))
            .route("/orchestrator/task", web::post().to(handlers::orchestrator::submit_task))

            // Resource Scheduler APIs
            .route("/scheduler/status", web::get().to(handlers::scheduler::get_status))
            .route("/scheduler/stats", web::get().to(handlers::scheduler::get_stats))
            .route("/scheduler/queue", web::get().to(handlers::scheduler::get_queue))
            .route("/scheduler/nodes", web::get().to(handlers::scheduler::list_nodes))
            .route("/scheduler/nodes", web::post().to(handlers::scheduler::add_node))
            .route("/scheduler/nodes/{id}", web::delete().to(handlers::scheduler::remove_node))
            .route("/scheduler/jobs", web::get().to(handlers::scheduler::list_jobs))
            .route("/scheduler/jobs", web::post().to(handlers::scheduler::submit_job))
            .route("/scheduler/jobs/{id}", web::get().to(handlers::scheduler::get_job))
            .route("/scheduler/jobs/{id}/cancel", web::post().to(handlers::scheduler::cancel_job))
            .route("/scheduler/jobs/{id}/complete", web::post().to(handlers::scheduler::complete_job))
            .route("/scheduler/algorithm", web::get().to(handlers::scheduler::get_algorithm))
            .route("/scheduler/algorithm", web::post().to(handlers::scheduler::set_algorithm))
            .route("/scheduler/tick", web::post().to(handlers::scheduler::tick))
            .route("/scheduler/events", web::get().to(handlers::scheduler::get_events))

            // Intelligent Cache APIs
            .route("/cache/stats", web::get().to(handlers::cache::get_stats))
            .route("/cache/entries/{key}", web::get().to(handlers::cache::get_entry))
            .route("/cache/entries/{key}", web::put().to(handlers::cache::put_entry))
            .route("/cache/entries/{key}", web::delete().to(handlers::cache::delete_entry))
            .route("/cache/clear", web::post().to(handlers::cache::clear))
            .route("/cache/cleanup", web::post().to(handlers::cache::cleanup))
            .route("/cache/policy", web::post().to(handlers::cache::set_policy))
            .route("/cache/events", web::get().to(handlers::cache::get_events))
    )
    .route("/metrics", web::get().to(handlers::system::prometheus_metrics));
}

/// Bind the management API server; the caller drives and stops it
pub fn start_web_server(app_state: web::Data<AppState>, config: &ServerConfig) -> std::io::Result<Server> {
    info!("Starting web server on http://{}:{}", config.host, config.port);

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure_routes)
    })
    .disable_signals();

    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    Ok(server.bind((config.host.as_str(), config.port))?.run())
}
