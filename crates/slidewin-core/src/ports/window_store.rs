//! Window store port.

use async_trait::async_trait;

use crate::domain::{Decision, RuleOutcome, WindowRule};

/// A backing store able to run the window procedures atomically.
///
/// Each method is one atomic unit on the store side and reads the store's own
/// clock. Keys arrive already namespaced.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Single-key admission.
    async fn attempt(&self, rule: &WindowRule) -> Result<Decision, StoreError>;

    /// Multi-rule admission sharing one timestamp.
    async fn attempt_rules(&self, rules: &[WindowRule]) -> Result<RuleOutcome, StoreError>;

    /// Trimmed entry count for `key`.
    async fn attempts(&self, key: &str, window_seconds: u64) -> Result<u64, StoreError>;

    /// Seconds until `rule.key` admits again; zero when under the limit.
    async fn available_in(&self, rule: &WindowRule) -> Result<u64, StoreError>;

    /// Delete `key`. Returns whether anything was removed.
    async fn reset(&self, key: &str) -> Result<bool, StoreError>;
}

/// Window store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Unexpected reply: {0}")]
    Protocol(String),
}
