//! HTTP handlers and route configuration.

mod demo;
mod health;
mod limits;

use std::sync::Arc;

use actix_web::web;

use crate::middleware::ThrottleRequests;
use crate::state::AppLimiter;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig, limiter: Arc<AppLimiter>) {
    cfg.service(
        web::scope("/api")
            // Public routes
            .route("/health", web::get().to(health::health_check))
            // Limit administration, behind the admin token
            .service(
                web::resource("/limits/{key}")
                    .route(web::get().to(limits::status))
                    .route(web::delete().to(limits::reset)),
            )
            // Throttled routes
            .service(
                web::resource("/ping")
                    .wrap(ThrottleRequests::named(limiter.clone(), "api"))
                    .route(web::get().to(demo::ping)),
            )
            .service(
                web::resource("/search")
                    .wrap(ThrottleRequests::params(limiter.clone(), "3|5", 1).with_prefix("search"))
                    .route(web::get().to(demo::search)),
            )
            .service(
                web::resource("/burst")
                    .wrap(ThrottleRequests::named(limiter.clone(), "burst"))
                    .route(web::get().to(demo::ping)),
            )
            .service(
                web::resource("/open")
                    .wrap(ThrottleRequests::named(limiter.clone(), "open"))
                    .route(web::get().to(demo::ping)),
            )
            .service(
                web::resource("/maintenance")
                    .wrap(ThrottleRequests::named(limiter, "maintenance"))
                    .route(web::get().to(demo::ping)),
            ),
    );
}
