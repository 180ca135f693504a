//! Middleware modules.

pub mod admin;
pub mod error;
pub mod throttle;

pub use admin::AdminAccess;
pub use error::{AppError, AppResult};
pub use throttle::{
    DirectResponse, JsonRejection, RequestContext, ResponseOverride, ThrottleRequests,
};
