//! Web handlers for the Intelligent Cache

use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde_json::json;

use crate::core::component::ComponentError;
use crate::instances::cache::EvictionPolicy;
use crate::web::models::{error_response, EventsQuery, CacheEntryRequest, PolicyRequest};
use crate::web::server::AppState;

const DEFAULT_EVENT_LIMIT: usize = 50;

pub async fn get_stats(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.cache.read().await;

    match instance.stats().await {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => {
            error!("Failed to read cache stats: {}", e);
            error_response(&e)
        }
    }
}

pub async fn get_entry(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let key = path.into_inner();
    let instance = app_state.cache.read().await;

    let value = match instance.get(&key).await {
        Ok(Some(value)) => value,
        Ok(None) => return error_response(&ComponentError::NotFound(format!("Cache key {}", key))),
        Err(e) => return error_response(&e),
    };

    // Tier after the lookup, so a promotion shows up immediately
    let tier = instance.tier_of(&key).await.ok().flatten();
    HttpResponse::Ok().json(json!({ "key": key, "value": value, "tier": tier }))
}

pub async fn put_entry(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<CacheEntryRequest>,
) -> impl Responder {
    let key = path.into_inner();
    let req = req.into_inner();
    let instance = app_state.cache.read().await;

    match instance.set(&key, req.value, req.ttl_secs).await {
        Ok(_) => HttpResponse::Ok().json(json!({ "success": true, "key": key })),
        Err(e) => {
            error!("Failed to cache {}: {}", key, e);
            error_response(&e)
        }
    }
}

pub async fn delete_entry(
    app_state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let key = path.into_inner();
    let instance = app_state.cache.read().await;

    match instance.delete(&key).await {
        Ok(true) => HttpResponse::Ok().json(json!({ "success": true, "key": key })),
        Ok(false) => error_response(&ComponentError::NotFound(format!("Cache key {}", key))),
        Err(e) => error_response(&e),
    }
}

pub async fn clear(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.cache.read().await;

    match instance.clear().await {
        Ok(_) => HttpResponse::Ok().json(json!({ "success": true })),
        Err(e) => error_response(&e),
    }
}

/// Drop expired entries from every tier
pub async fn cleanup(app_state: web::Data<AppState>) -> impl Responder {
    let instance = app_state.cache.read().await;

    match instance.cleanup_expired().await {
        Ok(removed) => HttpResponse::Ok().json(json!({ "success": true, "removed": removed })),
        Err(e) => error_response(&e),
    }
}

pub async fn set_policy(
    app_state: web::Data<AppState>,
    req: web::Json<PolicyRequest>,
) -> impl Responder {
    let policy: EvictionPolicy = match req.policy.parse() {
        Ok(policy) => policy,
        Err(e) => return error_response(&e),
    };

    let instance = app_state.cache.read().await;
    instance.set_eviction_policy(policy).await;
    HttpResponse::Ok().json(json!({ "success": true, "policy": policy }))
}

/// Most recent component events, oldest first
pub async fn get_events(
    app_state: web::Data<AppState>,
    query: web::Query<EventsQuery>,
) -> impl Responder {
    let instance = app_state.cache.read().await;
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
    async fn test_entry_crud() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure_routes)).await;

        let req = test::TestRequest::put()
            .uri("/api/cache/entries/user:1")
            .set_json(json!({"value": {"name": "Ada"}, "ttl_secs": 60}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/cache/entries/user:1").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["value"]["name"], "Ada");
        assert_eq!(body["tier"], "memory");

        let req = test::TestRequest::delete().uri("/api/cache/entries/user:1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/api/cache/entries/user:1").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/api/cache/stats").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["misses"], 1);
    }

    #[actix_web::test]
    async fn test_out_of_range_ttl_is_a_bad_request() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure_routes)).await;

        let req = test::TestRequest::put()
            .uri("/api/cache/entries/forever")
            .set_json(json!({"value": 1, "ttl_secs": u64::MAX}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::get().uri("/api/cache/entries/forever").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_policy_clear_and_cleanup() {
        let app = test::init_service(App::new().app_data(app_state().await).configure(configure_routes)).await;

        let req = test::TestRequest::post()
            .uri("/api/cache/policy")
            .set_json(json!({"policy": "lfu"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["policy"], "lfu");

        let req = test::TestRequest::get().uri("/api/cache/events?limit=10").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(!body["events"].as_array().unwrap().is_empty());

        let req = test::TestRequest::post()
            .uri("/api/cache/policy")
            .set_json(json!({"policy": "random"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post().uri("/api/cache/cleanup").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["removed"], 0);

        let req = test::TestRequest::post().uri("/api/cache/clear").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
