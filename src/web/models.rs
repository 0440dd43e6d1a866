use actix_web::HttpResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::component::ComponentError;

/// System status response
#[derive(Serialize)]
pub struct SystemStatusResponse {
    pub status: String,
    pub registered_components: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_seconds: i64,
    pub version: String,
    pub errors: Vec<String>,
}

/// Route a task to a component through the orchestrator
#[derive(Deserialize)]
pub struct TaskRequest {
    pub component_id: String,
    pub operation: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// `?status=` filter for the job listing
#[derive(Deserialize)]
pub struct JobListQuery {
    pub status: Option<String>,
}

/// `?limit=` for event listings
#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// Scheduling algorithm change request
#[derive(Deserialize)]
pub struct AlgorithmRequest {
    pub algorithm: String,
}

/// Manual completion of a running job
#[derive(Deserialize)]
pub struct CompleteJobRequest {
    #[serde(default = "default_success")]
    pub success: bool,
    pub reason: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Body of `PUT /api/cache/entries/{key}`
#[derive(Deserialize)]
pub struct CacheEntryRequest {
    pub value: serde_json::Value,
    pub ttl_secs: Option<u64>,
}

/// Eviction policy change request
#[derive(Deserialize)]
pub struct PolicyRequest {
    pub policy: String,
}

/// Generic response
#[derive(Serialize)]
pub struct GenericResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
}

/// Map a component error onto an HTTP status and JSON body
pub fn error_response(err: &ComponentError) -> HttpResponse {
    let (mut builder, code) = match err {
        ComponentError::ValidationError(_) | ComponentError::SerializationError(_) => {
            (HttpResponse::BadRequest(), "VALIDATION_FAILED")
        }
        ComponentError::NotFound(_) => (HttpResponse::NotFound(), "NOT_FOUND"),
        ComponentError::InvalidStateError(_) => (HttpResponse::Conflict(), "INVALID_STATE"),
        ComponentError::ResourceError(_) => (HttpResponse::Conflict(), "RESOURCE_UNAVAILABLE"),
        ComponentError::InitializationError(_)
        | ComponentError::ProcessingError(_)
        | ComponentError::PersistenceError(_) => (HttpResponse::InternalServerError(), "INTERNAL_ERROR"),
    };

    builder.json(ErrorResponse {
        success: false,
        error: err.to_string(),
        error_code: code.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ComponentError::ValidationError("x".into()), StatusCode::BAD_REQUEST),
            (ComponentError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ComponentError::InvalidStateError("x".into()), StatusCode::CONFLICT),
            (ComponentError::ResourceError("x".into()), StatusCode::CONFLICT),
            (ComponentError::PersistenceError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(error_response(&err).status(), status);
        }
    }
}
