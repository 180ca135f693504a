//! Admin token extractor guarding the limit administration routes.

use std::future::{Ready, ready};

use actix_web::{FromRequest, HttpRequest, dev::Payload, http::header, web};
use sha2::{Digest, Sha256};

use super::error::AppError;
use crate::state::AppState;

/// Proof that the request carried the configured admin token.
///
/// ```ignore
/// async fn reset(_admin: AdminAccess, state: web::Data<AppState>) -> AppResult<HttpResponse>
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AdminAccess;

impl FromRequest for AdminAccess {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authorize(req))
    }
}

fn authorize(req: &HttpRequest) -> Result<AdminAccess, AppError> {
    let expected = req
        .app_data::<web::Data<AppState>>()
        .and_then(|state| state.admin_token.clone())
        .ok_or(AppError::AdminDisabled)?;

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Expected Bearer token".to_string()))?;

    // Compare digests so the comparison time does not depend on the token prefix.
    if Sha256::digest(token.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        tracing::warn!(path = %req.path(), "Rejected admin request with a wrong token");
        return Err(AppError::Unauthorized("Invalid admin token".to_string()));
    }

    Ok(AdminAccess)
}
