//! Sample endpoints guarded by the throttle middleware.

use actix_web::HttpResponse;
use serde_json::json;

/// GET /api/ping
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "pong" }))
}

/// GET /api/search
pub async fn search() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "results": [] }))
}
