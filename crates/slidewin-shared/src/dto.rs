//! Data Transfer Objects - request/response types for the API.

use serde::{Deserialize, Serialize};

/// Query for inspecting one rate limit key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitQuery {
    pub max_attempts: u64,
    /// Window length in seconds.
    pub decay: u64,
}

/// Current state of one rate limit key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitStatusResponse {
    pub key: String,
    pub attempts: u64,
    pub remaining: i64,
    pub too_many_attempts: bool,
    pub available_in: u64,
}

/// Result of resetting a rate limit key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub key: String,
    pub removed: bool,
}
