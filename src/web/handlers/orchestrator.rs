use actix_web::{web, HttpResponse, Responder};
use log::{info, error};
use serde_json::json;

use crate::core::component::ComponentTask;
use crate::web::server::AppState;
use crate::web::models::{error_response, GenericResponse, ErrorResponse, TaskRequest};

/// Get the orchestrator status
pub async fn get_status(data: web::Data<AppState>) -> impl Responder {
    let orchestrator = data.orchestrator.read().await;
    let status = orchestrator.get_status();

    HttpResponse::Ok().json(json!({
        "success": true,
        "status": format!("{:?}", status.state),
        "registered_components": status.registered_components,
        "errors": status.errors,
        "last_updated": status.last_updated
    }))
}

/// Start all component instances
pub async fn start_all(data: web::Data<AppState>) -> impl Responder {
    let mut orchestrator = data.orchestrator.write().await;

    match orchestrator.start_all().await {
        Ok(_) => {
            info!("Started all components successfully");
            HttpResponse::Ok().json(GenericResponse {
                success: true,
                message: "All components started successfully".to_string(),
                data: None,
            })
        },
        Err(e) => {
            error!("Failed to start components: {:?}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                success: false,
                error: format!("Failed to start components: {}", e),
                error_code: "COMPONENT_START_FAILED".to_string(),
            })
        }
    }
}

/// Stop all component instances
pub async fn stop_all(data: web::Data<AppState>) -> impl Responder {
    let mut orchestrator = data.orchestrator.write().await;

    match orchestrator.stop_all().await {
        Ok(_) => {
            info!("Stopped all components successfully");
            HttpResponse::Ok().json(GenericResponse {
                success: true,
                message: "All components stopped successfully".to_string(),
                data: None,
            })
        },
        Err(e) => {
            error!("Failed to stop components: {:?}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                success: false,
                error: format!("Failed to stop components: {}", e),
                error_code: "COMPONENT_STOP_FAILED".to_string(),
            })
        }
    }
}

/// Dispatch a task to a component through the orchestrator
pub async fn submit_task(
    data: web::Data<AppState>,
    request: web::Json<TaskRequest>,
) -> impl Responder {
    let request = request.into_inner();
    let task = ComponentTask::new(&request.operation, request.parameters);
    let task_id = task.id.clone();

    let orchestrator = data.orchestrator.read().await;
    match orchestrator.submit_task(&request.component_id, task).await {
        Ok(result) => HttpResponse::Ok().json(GenericResponse {
            success: true,
            message: format!("Task {} processed by {}", task_id, request.component_id),
            data: Some(result),
        }),
        Err(e) => {
            error!("Task {} for {} failed: {}", task_id, request.component_id, e);
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App};
    use serde_json::json;

    use crate::web::handlers::test_support::app_state;
    use crate::web::server::configure_routes;

    #[actix_web::test]
    async fn test_start_dispatch_stop() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure_routes)).await;

        let req = test::TestRequest::post().uri("/api/orchestrator/start").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/orchestrator/task")
            .set_json(json!({
                "component_id": "intelligent_cache",
                "operation": "set",
                "parameters": {"key": "greeting", "value": "hello"}
            }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);

        let req = test::TestRequest::post()
            .uri("/api/orchestrator/task")
            .set_json(json!({"component_id": "nope", "operation": "stats"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post().uri("/api/orchestrator/stop").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/orchestrator/status").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "Stopped");
    }
}
