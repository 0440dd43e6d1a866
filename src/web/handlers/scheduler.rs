//! Web handlers for the Resource Scheduler

use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde_json::json;

use crate::core::component::Component;
use crate::instances::scheduler::{JobRequest, JobStatus, ResourceNode, SchedulingAlgorithm};
use crate::web::models::{error_response, EventsQuery, AlgorithmRequest, CompleteJobRequest, JobListQuery};
use crate::web::server::AppState;

const DEFAULT_EVENT_LIMIT: usize = 50;

/// Component status plus queue summary
pub async fn get_status(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.scheduler.read().await;

    HttpResponse::Ok().json(json!({
        "status": instance.status().to_string(),
        "info": instance.get_info(),
    }))
}

pub async fn get_stats(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.scheduler.read().await;
    HttpResponse::Ok().json(instance.stats().await)
}

/// Pending job ids in the order the current algorithm would run them
pub async fn get_queue(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.scheduler.read().await;
    HttpResponse::Ok().json(json!({ "queue": instance.queue_snapshot().await }))
}

pub async fn list_nodes(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.scheduler.read().await;
    HttpResponse::Ok().json(json!({ "nodes": instance.nodes().await }))
}

pub async fn add_node(
    app_state: web::Data<AppState>,
    req: web::Json<ResourceNode>,
) -> impl Responder {
    let instance = app_state.scheduler.read().await;
    let node = req.into_inner();
    let node_id = node.id.clone();

    match instance.add_node(node).await {
        Ok(_) => HttpResponse::Created().json(json!({ "success": true, "node_id": node_id })),
        Err(e) => {
            error!("Error adding node {}: {}", node_id, e);
            error_response(&e)
        }
    }
}

pub async fn remove_node(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let instance = app_state.scheduler.read().await;

    match instance.remove_node(&path.into_inner()).await {
        Ok(node) => HttpResponse::Ok().json(json!({ "success": true, "node": node })),
        Err(e) => error_response(&e),
    }
}

pub async fn list_jobs(
    app_state: web::Data<AppState>,
    query: web::Query<JobListQuery>,
) -> impl Responder {
    let status = match query.status.as_deref().map(str::parse::<JobStatus>).transpose() {
        Ok(status) => status,
        Err(e) => return error_response(&e),
    };

    let instance = app_state.scheduler.read().await;
    HttpResponse::Ok().json(json!({ "jobs": instance.list_jobs(status).await }))
}

pub async fn submit_job(
    app_state: web::Data<AppState>,
    req: web::Json<JobRequest>,
) -> impl Responder {
    let instance = app_state.scheduler.read().await;

    match instance.submit_job(req.into_inner()).await {
        Ok(job_id) => HttpResponse::Created().json(json!({ "success": true, "job_id": job_id })),
        Err(e) => {
            error!("Error submitting job: {}", e);
            error_response(&e)
        }
    }
}

pub async fn get_job(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let instance = app_state.scheduler.read().await;

    match instance.get_job(&path.into_inner()).await {
        Ok(job) => HttpResponse::Ok().json(job),
        Err(e) => error_response(&e),
    }
}

pub async fn cancel_job(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let instance = app_state.scheduler.read().await;

    match instance.cancel_job(&path.into_inner()).await {
        Ok(job) => HttpResponse::Ok().json(json!({ "success": true, "job": job })),
        Err(e) => error_response(&e),
    }
}

/// Report the outcome of a running job
pub async fn complete_job(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<CompleteJobRequest>,
) -> impl Responder {
    let instance = app_state.scheduler.read().await;
    let req = req.into_inner();

    match instance.complete_job(&path.into_inner(), req.success, req.reason).await {
        Ok(job) => HttpResponse::Ok().json(json!({ "success": true, "job": job })),
        Err(e) => error_response(&e),
    }
}

pub async fn get_algorithm(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.scheduler.read().await;
    HttpResponse::Ok().json(json!({ "algorithm": instance.algorithm().await }))
}

pub async fn set_algorithm(
    app_state: web::Data<AppState>,
    req: web::Json<AlgorithmRequest>,
) -> impl Responder {
    let algorithm: SchedulingAlgorithm = match req.algorithm.parse() {
        Ok(algorithm) => algorithm,
        Err(e) => return error_response(&e),
    };

    let instance = app_state.scheduler.read().await;
    instance.set_algorithm(algorithm).await;
    HttpResponse::Ok().json(json!({ "success": true, "algorithm": algorithm }))
}

/// Run one scheduling pass now
pub async fn tick(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.scheduler.read().await;

    match instance.tick().await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => {
            error!("Scheduling pass failed: {}", e);
            error_response(&e)
        }
    }
}

/// Most recent component events, oldest first
pub async fn get_events(
    app_state: web::Data<AppState>,
    query: web::Query<EventsQuery>,
) -> impl Responder {
    let instance = app_state.scheduler.read().await;
    let events = instance.base.get_recent_events(query.limit.unwrap_or(DEFAULT_EVENT_LIMIT)).await;
    HttpResponse::Ok().json(json!({ "events": events }))
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    use crate::web::handlers::test_support::app_state;
    use crate::web::server::configure_routes;

    #[actix_web::test]
    async fn test_job_lifecycle_over_http() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/scheduler/jobs")
            .set_json(json!({
                "name": "train",
                "requirements": {"cpu_cores": 1.0, "memory_gb": 1.0},
                "estimated_duration_secs": 3600.0
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get().uri("/api/scheduler/jobs?status=pending").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["jobs"].as_array().unwrap().len(), 1);

        let req = test::TestRequest::post().uri("/api/scheduler/tick").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["placed"][0][0], json!(job_id));

        let req = test::TestRequest::get().uri(&format!("/api/scheduler/jobs/{}", job_id)).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "running");

        let req = test::TestRequest::post()
            .uri(&format!("/api/scheduler/jobs/{}/cancel", job_id))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["job"]["status"], "cancelled");

        let req = test::TestRequest::get().uri("/api/scheduler/jobs/unknown").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_invalid_requests_map_to_400() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure_routes)).await;

        let req = test::TestRequest::get().uri("/api/scheduler/jobs?status=sleeping").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/scheduler/algorithm")
            .set_json(json!({"algorithm": "lottery"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/scheduler/jobs")
            .set_json(json!({
                "name": "endless",
                "requirements": {"cpu_cores": 1.0},
                "estimated_duration_secs": 1e13
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/api/scheduler/algorithm")
            .set_json(json!({"algorithm": "fair_share"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["algorithm"], "fair_share");
    }

    #[actix_web::test]
    async fn test_node_management() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/scheduler/nodes")
            .set_json(json!({
                "id": "edge-1",
                "name": "Edge",
                "capacity": {"cpu_cores": 4.0, "memory_gb": 8.0}
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::delete().uri("/api/scheduler/nodes/edge-1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::delete().uri("/api/scheduler/nodes/edge-1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
