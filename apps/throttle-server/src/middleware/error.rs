//! Error handling - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use slidewin_core::LimiterError;
use slidewin_shared::ErrorResponse;
use std::fmt;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// No user or client address to key the request by.
    MissingSignature,
    Misconfigured(String),
    StoreUnavailable(String),
    /// Missing or wrong admin token.
    Unauthorized(String),
    /// No admin token is configured, so the admin API is off.
    AdminDisabled,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::MissingSignature => {
                write!(f, "Unable to generate the request signature")
            }
            AppError::Misconfigured(msg) => write!(f, "Misconfigured rate limit: {}", msg),
            AppError::StoreUnavailable(msg) => write!(f, "Rate limit store unavailable: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::AdminDisabled => write!(f, "Admin API is disabled"),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::MissingSignature | AppError::Misconfigured(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::AdminDisabled => StatusCode::FORBIDDEN,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::MissingSignature | AppError::Misconfigured(_) => {
                tracing::error!("{}", self);
                ErrorResponse::internal_error().with_detail(self.to_string())
            }
            AppError::StoreUnavailable(detail) => {
                tracing::error!("Rate limit store error: {}", detail);
                ErrorResponse::service_unavailable("Rate limiting is temporarily unavailable")
            }
            AppError::Unauthorized(detail) => {
                ErrorResponse::new(401, "Authentication Required").with_detail(detail)
            }
            AppError::AdminDisabled => ErrorResponse::new(403, "Forbidden")
                .with_detail("Set RATE_LIMIT_ADMIN_TOKEN to enable the admin API."),
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

impl From<LimiterError> for AppError {
    fn from(err: LimiterError) -> Self {
        match err {
            LimiterError::Store(e) => AppError::StoreUnavailable(e.to_string()),
            LimiterError::InvalidConfiguration(msg) => AppError::Misconfigured(msg),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
