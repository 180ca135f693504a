//! Throttle middleware - admits each request against sliding-window limits.
//!
//! Limits come either from a named limiter in the registry or from route
//! parameters (max attempts and decay minutes). Accepted responses carry
//! `X-RateLimit-Limit` and `X-RateLimit-Remaining`; rejections also carry
//! `Retry-After` and `X-RateLimit-Reset`.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpResponse, ResponseError,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::StatusCode,
    http::header::{self, HeaderMap, HeaderName, HeaderValue},
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use slidewin_core::{Decision, Limit, LimitOutcome, LimiterError};
use slidewin_shared::ErrorResponse;

use super::error::AppError;
use crate::state::{AppLimiter, AppOutcome};

/// Header carrying the authenticated user, set by an upstream gateway.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Request identity handed to named limiters.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub ip: Option<String>,
    pub host: String,
    pub path: String,
}

impl RequestContext {
    pub fn from_request(req: &ServiceRequest) -> Self {
        let info = req.connection_info();
        Self {
            user_id: req
                .headers()
                .get(USER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from),
            ip: info.realip_remote_addr().map(String::from),
            host: info.host().to_string(),
            path: req.path().to_string(),
        }
    }

    /// The user if known, else the client address.
    pub fn subject(&self) -> Option<&str> {
        self.user_id.as_deref().or(self.ip.as_deref())
    }

    /// Hashed identity used to key parameter-mode limits.
    pub fn signature(&self) -> Result<String, AppError> {
        if let Some(user) = &self.user_id {
            return Ok(sha256_hex(user));
        }
        match &self.ip {
            Some(ip) => Ok(sha256_hex(&format!("{}|{}", self.host, ip))),
            None => Err(AppError::MissingSignature),
        }
    }
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// Rate limit headers derived from a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u64,
    pub remaining: i64,
    pub retry_after: Option<u64>,
    pub reset: Option<i64>,
}

impl RateLimitHeaders {
    pub fn from_decision(decision: &Decision, now: DateTime<Utc>) -> Self {
        let rejected = !decision.successful();
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            retry_after: rejected.then_some(decision.wait_seconds),
            reset: rejected.then(|| decision.available_at_from(now)),
        }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from(self.remaining),
        );
        if let Some(retry_after) = self.retry_after {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        if let Some(reset) = self.reset {
            headers.insert(
                HeaderName::from_static("x-ratelimit-reset"),
                HeaderValue::from(reset),
            );
        }
    }
}

/// Builds the response sent when a limit carrying it rejects a request.
pub trait RejectionResponder: Send + Sync {
    fn respond(&self, ctx: &RequestContext, headers: &RateLimitHeaders) -> HttpResponse;
}

pub type ResponseOverride = Arc<dyn RejectionResponder>;

/// Rejects with a fixed JSON body and status, plus the rate limit headers.
#[derive(Debug, Clone)]
pub struct JsonRejection {
    status: StatusCode,
    body: serde_json::Value,
}

impl JsonRejection {
    pub fn new(status: StatusCode, body: serde_json::Value) -> Self {
        Self { status, body }
    }
}

impl RejectionResponder for JsonRejection {
    fn respond(&self, _ctx: &RequestContext, headers: &RateLimitHeaders) -> HttpResponse {
        let mut response = HttpResponse::build(self.status).json(&self.body);
        headers.apply(response.headers_mut());
        response
    }
}

/// A response a named limiter answers with instead of limiting.
#[derive(Debug, Clone)]
pub struct DirectResponse {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl DirectResponse {
    pub fn into_response(self) -> HttpResponse {
        HttpResponse::build(self.status).json(self.body)
    }
}

#[derive(Debug)]
enum ThrottleMode {
    Named(String),
    Params {
        max_attempts: String,
        decay_minutes: u64,
        prefix: String,
    },
}

/// Throttle middleware factory.
pub struct ThrottleRequests {
    limiter: Arc<AppLimiter>,
    mode: Rc<ThrottleMode>,
}

impl ThrottleRequests {
    /// Throttle with the named limiter `name`.
    ///
    /// A name missing from the registry is read as a max attempts parameter with a
    /// one minute decay.
    pub fn named(limiter: Arc<AppLimiter>, name: impl Into<String>) -> Self {
        Self {
            limiter,
            mode: Rc::new(ThrottleMode::Named(name.into())),
        }
    }

    /// Throttle by client identity.
    ///
    /// `max_attempts` is a number, or `guest|user` to give identified users their own
    /// allowance.
    pub fn params(
        limiter: Arc<AppLimiter>,
        max_attempts: impl Into<String>,
        decay_minutes: u64,
    ) -> Self {
        Self {
            limiter,
            mode: Rc::new(ThrottleMode::Params {
                max_attempts: max_attempts.into(),
                decay_minutes,
                prefix: String::new(),
            }),
        }
    }

    /// Prefix parameter-mode keys so routes with different limits do not share windows.
    pub fn with_prefix(self, prefix: impl Into<String>) -> Self {
        let mode = match Rc::try_unwrap(self.mode) {
            Ok(ThrottleMode::Params {
                max_attempts,
                decay_minutes,
                ..
            }) => ThrottleMode::Params {
                max_attempts,
                decay_minutes,
                prefix: prefix.into(),
            },
            Ok(mode) => mode,
            Err(shared) => return Self { limiter: self.limiter, mode: shared },
        };
        Self {
            limiter: self.limiter,
            mode: Rc::new(mode),
        }
    }
}

/// Parse a `max` or `guest|user` max attempts parameter.
pub fn resolve_max_attempts(value: &str, authenticated: bool) -> Result<u64, LimiterError> {
    let value = match value.split_once('|') {
        Some((_, user)) if authenticated => user,
        Some((guest, _)) => guest,
        None => value,
    };

    match value.trim().parse::<u64>() {
        Ok(max_attempts) if max_attempts > 0 => Ok(max_attempts),
        _ => Err(LimiterError::InvalidConfiguration(
            "Unable to rate limit if max attempts equal to 0".to_string(),
        )),
    }
}

fn params_limit(
    max_attempts: &str,
    decay_minutes: u64,
    prefix: &str,
    ctx: &RequestContext,
) -> Result<Limit<ResponseOverride>, AppError> {
    let max_attempts = resolve_max_attempts(max_attempts, ctx.user_id.is_some())?;
    let key = format!("{}{}", prefix, ctx.signature()?);
    Ok(Limit::per_minutes(decay_minutes, max_attempts).by(key))
}

fn resolve(
    limiter: &AppLimiter,
    mode: &ThrottleMode,
    ctx: &RequestContext,
) -> Result<AppOutcome, AppError> {
    match mode {
        ThrottleMode::Named(name) => match limiter.resolve(name, ctx) {
            Some(LimitOutcome::Limits(limits)) => Ok(LimitOutcome::Limits(
                limits
                    .into_iter()
                    .map(|limit| {
                        let key = sha256_hex(&format!("{}{}", name, limit.key));
                        limit.by(key)
                    })
                    .collect(),
            )),
            Some(outcome) => Ok(outcome),
            None => Ok(params_limit(name, 1, "", ctx)?.into()),
        },
        ThrottleMode::Params {
            max_attempts,
            decay_minutes,
            prefix,
        } => Ok(params_limit(max_attempts, *decay_minutes, prefix, ctx)?.into()),
    }
}

fn too_many_requests(headers: &RateLimitHeaders) -> HttpResponse {
    let error = ErrorResponse::too_many_requests(headers.retry_after.unwrap_or(0));
    let mut response = HttpResponse::TooManyRequests().json(error);
    headers.apply(response.headers_mut());
    response
}

fn respond_with<B>(req: ServiceRequest, response: HttpResponse) -> ServiceResponse<EitherBody<B>> {
    let (http_req, _payload) = req.into_parts();
    ServiceResponse::new(http_req, response).map_into_right_body()
}

impl<S, B> Transform<S, ServiceRequest> for ThrottleRequests
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = ThrottleRequestsService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ThrottleRequestsService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            mode: self.mode.clone(),
        }))
    }
}

pub struct ThrottleRequestsService<S> {
    service: Rc<S>,
    limiter: Arc<AppLimiter>,
    mode: Rc<ThrottleMode>,
}

impl<S, B> Service<ServiceRequest> for ThrottleRequestsService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let mode = self.mode.clone();

        Box::pin(async move {
            let ctx = RequestContext::from_request(&req);

            let limits = match resolve(&limiter, &mode, &ctx) {
                Ok(LimitOutcome::Limits(limits)) => limits,
                Ok(LimitOutcome::Unlimited) => {
                    let res = service.call(req).await?;
                    return Ok(res.map_into_left_body());
                }
                Ok(LimitOutcome::Response(direct)) => {
                    return Ok(respond_with(req, direct.into_response()));
                }
                Err(e) => return Ok(respond_with(req, e.error_response())),
            };

            // Store failures are reported, not failed open.
            let result = match limiter.attempt_limit_rules(&limits).await {
                Ok(result) => result,
                Err(e) => return Ok(respond_with(req, AppError::from(e).error_response())),
            };
            let headers = RateLimitHeaders::from_decision(&result.decision, Utc::now());

            if !result.successful() {
                tracing::warn!(
                    path = %ctx.path,
                    subject = ctx.subject().unwrap_or("unknown"),
                    rule_index = result.rule_index,
                    retry_after = result.decision.wait_seconds,
                    "Rate limit exceeded"
                );

                let response = match &result.response_override {
                    Some(responder) => responder.respond(&ctx, &headers),
                    None => too_many_requests(&headers),
                };
                return Ok(respond_with(req, response));
            }

            let mut res = service.call(req).await?;
            headers.apply(res.headers_mut());
            Ok::<_, Error>(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test as actix_test, web};
    use async_trait::async_trait;
    use serde_json::json;

    use slidewin_core::domain::{RuleOutcome, WindowRule};
    use slidewin_core::ports::{ManualClock, StoreError, WindowStore};
    use slidewin_infra::InMemoryWindowStore;

    fn test_limiter() -> Arc<AppLimiter> {
        let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
        let store = Arc::new(InMemoryWindowStore::with_clock(clock));
        let mut limiter = AppLimiter::new(store);

        limiter
            .register("test", |_: &RequestContext| -> AppOutcome {
                Limit::per_seconds(30, 3).into()
            })
            .register("per-minute", |_: &RequestContext| -> AppOutcome {
                Limit::per_minute(3).into()
            })
            .register("unlimited", |_: &RequestContext| -> AppOutcome {
                LimitOutcome::Unlimited
            })
            .register("direct", |_: &RequestContext| -> AppOutcome {
                LimitOutcome::Response(DirectResponse {
                    status: StatusCode::OK,
                    body: json!({ "ok": true }),
                })
            })
            .register("custom", |_: &RequestContext| -> AppOutcome {
                let responder: ResponseOverride = Arc::new(JsonRejection::new(
                    StatusCode::MISDIRECTED_REQUEST,
                    json!("HttpResponseException"),
                ));
                Limit::per_minute(1).response(responder).into()
            });

        Arc::new(limiter)
    }

    fn get(uri: &str) -> actix_test::TestRequest {
        actix_test::TestRequest::get()
            .uri(uri)
            .peer_addr("127.0.0.1:40000".parse().unwrap())
    }

    fn header(
        res: &ServiceResponse<impl actix_web::body::MessageBody>,
        name: &str,
    ) -> Option<String> {
        res.headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    }

    async fn yes() -> &'static str {
        "yes"
    }

    #[actix_web::test]
    async fn test_named_limiter_adds_headers() {
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::named(test_limiter(), "test"))
                .route("/", web::get().to(yes)),
        )
        .await;

        let res = actix_test::call_service(&app, get("/").to_request()).await;

        assert!(res.status().is_success());
        assert_eq!(header(&res, "x-ratelimit-limit").as_deref(), Some("3"));
        assert_eq!(header(&res, "x-ratelimit-remaining").as_deref(), Some("2"));
        assert!(header(&res, "retry-after").is_none());
    }

    #[actix_web::test]
    async fn test_rejection_carries_retry_headers() {
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::named(test_limiter(), "per-minute"))
                .route("/", web::get().to(yes)),
        )
        .await;

        for _ in 0..2 {
            actix_test::call_service(&app, get("/").to_request()).await;
        }
        let res = actix_test::call_service(&app, get("/").to_request()).await;
        assert_eq!(header(&res, "x-ratelimit-remaining").as_deref(), Some("0"));

        let res = actix_test::call_service(&app, get("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = header(&res, "retry-after").unwrap().parse().unwrap();
        assert!((59..=60).contains(&retry_after));
        assert!(header(&res, "x-ratelimit-reset").is_some());
    }

    #[actix_web::test]
    async fn test_unlimited_skips_headers() {
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::named(test_limiter(), "unlimited"))
                .route("/", web::get().to(yes)),
        )
        .await;

        let res = actix_test::call_service(&app, get("/").to_request()).await;

        assert!(res.status().is_success());
        assert!(header(&res, "x-ratelimit-limit").is_none());
    }

    #[actix_web::test]
    async fn test_direct_response_short_circuits() {
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::named(test_limiter(), "direct"))
                .route("/", web::get().to(yes)),
        )
        .await;

        let body: serde_json::Value =
            actix_test::call_and_read_body_json(&app, get("/").to_request()).await;

        assert_eq!(body, json!({ "ok": true }));
    }

    #[actix_web::test]
    async fn test_response_override_on_rejection() {
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::named(test_limiter(), "custom"))
                .route("/", web::get().to(yes)),
        )
        .await;

        actix_test::call_service(&app, get("/").to_request()).await;
        let res = actix_test::call_service(&app, get("/").to_request()).await;

        assert_eq!(res.status(), StatusCode::MISDIRECTED_REQUEST);
        assert!(header(&res, "retry-after").is_some());
        let body = actix_test::read_body(res).await;
        assert_eq!(body, "\"HttpResponseException\"");
    }

    #[actix_web::test]
    async fn test_params_split_guest_and_user() {
        let limiter = test_limiter();
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::params(limiter, "3|5", 1))
                .route("/", web::get().to(yes)),
        )
        .await;

        let res = actix_test::call_service(&app, get("/").to_request()).await;
        assert_eq!(header(&res, "x-ratelimit-limit").as_deref(), Some("3"));
        assert_eq!(header(&res, "x-ratelimit-remaining").as_deref(), Some("2"));

        let res = actix_test::call_service(
            &app,
            get("/").insert_header((USER_ID_HEADER, "1000")).to_request(),
        )
        .await;
        assert_eq!(header(&res, "x-ratelimit-limit").as_deref(), Some("5"));
        assert_eq!(header(&res, "x-ratelimit-remaining").as_deref(), Some("4"));
    }

    #[actix_web::test]
    async fn test_unknown_name_is_misconfigured() {
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::named(test_limiter(), "__test__"))
                .route("/", web::get().to(yes)),
        )
        .await;

        let res = actix_test::call_service(&app, get("/").to_request()).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_missing_identity_is_an_error() {
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::params(test_limiter(), "3", 1))
                .route("/", web::get().to(yes)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/").to_request();
        let res = actix_test::call_service(&app, req).await;

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    struct FailingStore;

    #[async_trait]
    impl WindowStore for FailingStore {
        async fn attempt(&self, _rule: &WindowRule) -> Result<Decision, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }

        async fn attempt_rules(&self, _rules: &[WindowRule]) -> Result<RuleOutcome, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }

        async fn attempts(&self, _key: &str, _window_seconds: u64) -> Result<u64, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }

        async fn available_in(&self, _rule: &WindowRule) -> Result<u64, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }

        async fn reset(&self, _key: &str) -> Result<bool, StoreError> {
            Err(StoreError::Connection("refused".to_string()))
        }
    }

    #[actix_web::test]
    async fn test_store_failure_is_not_failed_open() {
        let limiter = Arc::new(AppLimiter::new(Arc::new(FailingStore)));
        let app = actix_test::init_service(
            App::new()
                .wrap(ThrottleRequests::params(limiter, "3", 1))
                .route("/", web::get().to(yes)),
        )
        .await;

        let res = actix_test::call_service(&app, get("/").to_request()).await;

        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_resolve_max_attempts() {
        assert_eq!(resolve_max_attempts("60", false).unwrap(), 60);
        assert_eq!(resolve_max_attempts("3|5", false).unwrap(), 3);
        assert_eq!(resolve_max_attempts("3|5", true).unwrap(), 5);
        assert!(resolve_max_attempts("0", false).is_err());
        assert!(resolve_max_attempts("max_attempts", true).is_err());
    }

    #[test]
    fn test_signature_prefers_user() {
        let ctx = RequestContext {
            user_id: Some("1000".to_string()),
            ip: Some("127.0.0.1".to_string()),
            ..Default::default()
        };
        assert_eq!(ctx.signature().unwrap(), sha256_hex("1000"));

        let ctx = RequestContext {
            ip: Some("127.0.0.1".to_string()),
            ..Default::default()
        };
        assert_eq!(ctx.signature().unwrap(), sha256_hex("|127.0.0.1"));
    }

    #[test]
    fn test_headers_from_rejection() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let headers = RateLimitHeaders::from_decision(&Decision::rejected(11, 30), now);

        assert_eq!(headers.retry_after, Some(11));
        assert_eq!(headers.reset, Some(1_700_000_011));
        assert_eq!(
            RateLimitHeaders::from_decision(&Decision::accepted(3, 30), now).reset,
            None
        );
    }
}
