use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use log::error;
use serde::Deserialize;
use serde_json::json;

use crate::core::metrics::render_prometheus;
use crate::web::models::{error_response, SystemStatusResponse};
use crate::web::server::AppState;

/// Get the overall system status
pub async fn get_system_status(data: web::Data<AppState>) -> impl Responder {
    let orchestrator = data.orchestrator.read().await;
    let status = orchestrator.get_status();

    let response = SystemStatusResponse {
        status: format!("{:?}", status.state),
        registered_components: status.registered_components,
        started_at: status.started_at,
        uptime_seconds: status
            .started_at
            .map(|started| (Utc::now() - started).num_seconds())
            .unwrap_or(0),
        version: env!("CARGO_PKG_VERSION").to_string(),
        errors: status.errors.clone(),
    };

    HttpResponse::Ok().json(response)
}

/// Latest collected metrics per component plus totals
pub async fn get_system_metrics(data: web::Data<AppState>) -> impl Responder {
    let summary = data.metrics.get_system_summary().await;
    HttpResponse::Ok().json(summary)
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// Metrics history of one component, newest last
pub async fn get_component_history(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> impl Responder {
    let component_id = path.into_inner();
    let history = data.metrics.get_component_history(&component_id, query.limit).await;

    HttpResponse::Ok().json(json!({
        "success": true,
        "component_id": component_id,
        "history": history,
    }))
}

/// Get information about all components
pub async fn get_components(data: web::Data<AppState>) -> impl Responder {
    let components = data.orchestrator.read().await.component_summaries().await;

    HttpResponse::Ok().json(json!({
        "success": true,
        "components": components
    }))
}

/// Prometheus text exposition
pub async fn prometheus_metrics() -> impl Responder {
    match render_prometheus() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            error_response(&e)
        }
    }
}
