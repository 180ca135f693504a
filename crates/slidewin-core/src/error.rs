//! Limiter-level error types.

use thiserror::Error;

use crate::ports::StoreError;

/// Errors surfaced by the rate limiter facade.
#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl LimiterError {
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, LimiterError::Store(_))
    }
}
