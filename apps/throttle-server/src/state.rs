//! Application state - shared across all handlers.

use std::sync::Arc;

use slidewin_core::ports::{StoreError, WindowStore};
use slidewin_core::{LimitOutcome, SlidingWindowRateLimiter};
use slidewin_infra::{InMemoryWindowStore, RedisConfig};

#[cfg(feature = "redis")]
use slidewin_infra::RedisWindowStore;

use crate::config::AppConfig;
use crate::limiters;
use crate::middleware::{DirectResponse, RequestContext, ResponseOverride};

/// The limiter as the server uses it: named limiters see the request context, limits
/// may carry a rejection responder, and a named limiter may answer directly.
pub type AppLimiter = SlidingWindowRateLimiter<RequestContext, ResponseOverride, DirectResponse>;

pub type AppOutcome = LimitOutcome<ResponseOverride, DirectResponse>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<AppLimiter>,
    /// `redis` or `memory`.
    pub store_kind: &'static str,
    pub admin_token: Option<String>,
}

impl AppState {
    /// Build the application state, connecting to the configured window store.
    pub async fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let (store, store_kind) = connect_store(&config.redis).await?;

        let limiter = AppLimiter::new(store)
            .with_prefix(config.key_prefix.clone())
            .with_registry(limiters::registry(config));

        tracing::info!(
            store = store_kind,
            prefix = %config.key_prefix,
            "Application state initialized"
        );

        if config.admin_token.is_none() {
            tracing::warn!("RATE_LIMIT_ADMIN_TOKEN not set. Admin routes are disabled.");
        }

        let state = Self::with_limiter(limiter, store_kind);
        Ok(match &config.admin_token {
            Some(token) => state.with_admin_token(token.clone()),
            None => state,
        })
    }

    pub fn with_limiter(limiter: AppLimiter, store_kind: &'static str) -> Self {
        Self {
            limiter: Arc::new(limiter),
            store_kind,
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }
}

#[cfg(feature = "redis")]
async fn connect_store(
    config: &RedisConfig,
) -> Result<(Arc<dyn WindowStore>, &'static str), StoreError> {
    match RedisWindowStore::new(config).await {
        Ok(store) => Ok((Arc::new(store), "redis")),
        Err(e) if config.fallback_to_memory => {
            tracing::error!("Failed to connect to Redis: {}. Using in-memory fallback.", e);
            Ok((Arc::new(InMemoryWindowStore::new()), "memory"))
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(feature = "redis"))]
async fn connect_store(
    _config: &RedisConfig,
) -> Result<(Arc<dyn WindowStore>, &'static str), StoreError> {
    tracing::info!("Running without redis feature - using in-memory window store");
    Ok((Arc::new(InMemoryWindowStore::new()), "memory"))
}
