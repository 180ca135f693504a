//! Limit administration endpoints.
//!
//! Keys are passed without the limiter's namespace prefix. Both routes require the
//! admin bearer token.

use actix_web::{HttpResponse, web};
use slidewin_core::LimiterError;
use slidewin_shared::ApiResponse;
use slidewin_shared::dto::{LimitQuery, LimitStatusResponse, ResetResponse};

use crate::middleware::{AdminAccess, AppError, AppResult};
use crate::state::AppState;

fn admin_error(err: LimiterError) -> AppError {
    match err {
        LimiterError::InvalidConfiguration(msg) => AppError::BadRequest(msg),
        other => other.into(),
    }
}

/// Inspect a key without recording an attempt.
///
/// GET /api/limits/{key}?max_attempts=60&decay=60
pub async fn status(
    _admin: AdminAccess,
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<LimitQuery>,
) -> AppResult<HttpResponse> {
    let key = path.into_inner();
    let LimitQuery {
        max_attempts,
        decay,
    } = query.into_inner();
    let limiter = &state.limiter;

    let attempts = limiter.attempts(&key, decay).await.map_err(admin_error)?;
    let remaining = limiter
        .remaining(&key, max_attempts, decay)
        .await
        .map_err(admin_error)?;
    let available_in = limiter
        .available_in(&key, max_attempts, decay)
        .await
        .map_err(admin_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(LimitStatusResponse {
        key,
        attempts,
        remaining,
        too_many_attempts: attempts >= max_attempts,
        available_in,
    })))
}

/// Delete every attempt recorded for a key.
///
/// DELETE /api/limits/{key}
pub async fn reset(
    _admin: AdminAccess,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let key = path.into_inner();
    let removed = state.limiter.reset_attempts(&key).await?;

    tracing::info!(key = %key, removed, "Rate limit key reset");

    Ok(HttpResponse::Ok().json(ApiResponse::ok(ResetResponse { key, removed })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, http::header, test as actix_test};
    use serde_json::Value;

    use crate::handlers::tests::test_state;

    const TOKEN: &str = "admin-secret";

    fn admin(req: actix_test::TestRequest) -> actix_test::TestRequest {
        req.insert_header((header::AUTHORIZATION, format!("Bearer {TOKEN}")))
    }

    #[actix_web::test]
    async fn test_status_and_reset() {
        let state = test_state().with_admin_token(TOKEN);
        state.limiter.attempt("client-a", 2, 60).await.unwrap();
        state.limiter.attempt("client-a", 2, 60).await.unwrap();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/limits/{key}", web::get().to(status))
                .route("/limits/{key}", web::delete().to(reset)),
        )
        .await;

        let req = admin(actix_test::TestRequest::get())
            .uri("/limits/client-a?max_attempts=2&decay=60")
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["attempts"], 2);
        assert_eq!(body["data"]["remaining"], 0);
        assert_eq!(body["data"]["too_many_attempts"], true);
        assert_eq!(body["data"]["available_in"], 60);

        let req = admin(actix_test::TestRequest::delete())
            .uri("/limits/client-a")
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["removed"], true);

        let req = admin(actix_test::TestRequest::get())
            .uri("/limits/client-a?max_attempts=2&decay=60")
            .to_request();
        let body: Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["attempts"], 0);
    }

    #[actix_web::test]
    async fn test_reset_requires_admin_token() {
        let state = test_state().with_admin_token(TOKEN);
        state.limiter.attempt("client-a", 1, 60).await.unwrap();
        let limiter = state.limiter.clone();

        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/limits/{key}", web::delete().to(reset)),
        )
        .await;

        let req = actix_test::TestRequest::delete()
            .uri("/limits/client-a")
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let req = actix_test::TestRequest::delete()
            .uri("/limits/client-a")
            .insert_header((header::AUTHORIZATION, "Bearer guessed"))
            .to_request();
        let res = actix_test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(limiter.attempts("client-a", 60).await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn test_admin_routes_disabled_without_token() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_state()))
                .route("/limits/{key}", web::delete().to(reset)),
        )
        .await;

        let req = admin(actix_test::TestRequest::delete())
            .uri("/limits/client-a")
            .to_request();
        let res = actix_test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_invalid_window_is_bad_request() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(test_state().with_admin_token(TOKEN)))
                .route("/limits/{key}", web::get().to(status)),
        )
        .await;

        for query in [
            "max_attempts=0&decay=60",
            "max_attempts=1&decay=18446744073709551615",
            "max_attempts=1&decay=9223372036854775807",
        ] {
            let req = admin(actix_test::TestRequest::get())
                .uri(&format!("/limits/client-a?{query}"))
                .to_request();
            let res = actix_test::call_service(&app, req).await;

            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{query}");
        }
    }
}
