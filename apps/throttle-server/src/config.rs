//! Application configuration loaded from environment variables.

use std::env;

use slidewin_core::DEFAULT_KEY_PREFIX;
use slidewin_infra::RedisConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub redis: RedisConfig,
    /// Namespace for every key the limiter writes.
    pub key_prefix: String,
    /// Allowance of the `api` named limiter.
    pub max_attempts: u64,
    /// Window of the `api` named limiter, in seconds.
    pub decay_secs: u64,
    /// Bearer token for the admin routes. Without one they answer 403.
    pub admin_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            redis: RedisConfig::from_env(),
            key_prefix: env::var("RATE_LIMIT_KEY_PREFIX")
                .ok()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            max_attempts: env::var("RATE_LIMIT_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(60),
            decay_secs: env::var("RATE_LIMIT_DECAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(60),
            admin_token: env::var("RATE_LIMIT_ADMIN_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
        }
    }
}
