//! Named limiters served by the throttle middleware.

use std::sync::Arc;

use actix_web::http::StatusCode;
use serde_json::json;
use slidewin_core::{Limit, LimitOutcome, LimiterRegistry, RuleBuilder};

use crate::config::AppConfig;
use crate::middleware::{DirectResponse, JsonRejection, RequestContext, ResponseOverride};
use crate::state::AppOutcome;

pub type AppRegistry = LimiterRegistry<RequestContext, ResponseOverride, DirectResponse>;

/// One window per client, sized from configuration.
#[derive(Debug, Clone)]
pub struct PerClient {
    pub max_attempts: u64,
    pub decay_seconds: u64,
}

impl RuleBuilder<RequestContext, ResponseOverride, DirectResponse> for PerClient {
    fn build(&self, ctx: &RequestContext) -> AppOutcome {
        Limit::per_seconds(self.decay_seconds, self.max_attempts)
            .by(ctx.subject().unwrap_or_default())
            .into()
    }
}

/// A short burst allowance inside a longer per-minute allowance.
///
/// Exhausting the burst answers with its own body so clients can tell it apart.
#[derive(Debug, Clone)]
pub struct Burst {
    pub per_second: u64,
    pub per_minute: u64,
}

impl RuleBuilder<RequestContext, ResponseOverride, DirectResponse> for Burst {
    fn build(&self, ctx: &RequestContext) -> AppOutcome {
        let subject = ctx.subject().unwrap_or_default();
        let slow_down: ResponseOverride = Arc::new(JsonRejection::new(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "message": "Slow down", "limit": "burst" }),
        ));

        vec![
            Limit::per_seconds(1, self.per_second)
                .by(format!("second:{subject}"))
                .response(slow_down),
            Limit::per_minute(self.per_minute).by(format!("minute:{subject}")),
        ]
        .into()
    }
}

/// Build the registry of named limiters.
pub fn registry(config: &AppConfig) -> AppRegistry {
    let mut registry = AppRegistry::new();

    registry
        .register(
            "api",
            PerClient {
                max_attempts: config.max_attempts,
                decay_seconds: config.decay_secs,
            },
        )
        .register(
            "burst",
            Burst {
                per_second: 2,
                per_minute: 30,
            },
        )
        .register("open", |ctx: &RequestContext| -> AppOutcome {
            // Identified users are not limited.
            match ctx.user_id {
                Some(_) => LimitOutcome::Unlimited,
                None => Limit::per_minute(10).by(ctx.subject().unwrap_or_default()).into(),
            }
        })
        .register("maintenance", |_: &RequestContext| -> AppOutcome {
            LimitOutcome::Response(DirectResponse {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: json!({ "message": "Down for maintenance" }),
            })
        });

    registry
}
