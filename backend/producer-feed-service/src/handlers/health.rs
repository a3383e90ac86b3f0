use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::warn;

use super::FeedHandlerState;

pub async fn live() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Ready when the store answers a ping
pub async fn ready(state: web::Data<FeedHandlerState>) -> HttpResponse {
    match state.engine.store().ping().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "ready" })),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unavailable",
                "error": e.to_string()
            }))
        }
    }
}
