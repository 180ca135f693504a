//! The sliding-window rate limiter facade.

use std::sync::Arc;

use crate::domain::{Decision, Limit, LimitOutcome, RuleDecision, WindowRule};
use crate::error::LimiterError;
use crate::ports::WindowStore;
use crate::registry::{LimiterRegistry, RuleBuilder};

/// Namespace prepended to every key written to the store.
pub const DEFAULT_KEY_PREFIX: &str = "sliding_rate_limiter";

/// Longest accepted window, one hundred years.
pub const MAX_DECAY_SECONDS: u64 = 100 * 365 * Limit::<()>::DAY;

/// Sliding-window-log rate limiter over a [`WindowStore`].
///
/// `C`, `O` and `R` are the request context, response override and raw response
/// types of the named limiters it holds; plain key-based use can leave them as `()`.
pub struct SlidingWindowRateLimiter<C = (), O = (), R = ()> {
    store: Arc<dyn WindowStore>,
    prefix: String,
    registry: LimiterRegistry<C, O, R>,
}

impl<C, O, R> SlidingWindowRateLimiter<C, O, R> {
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self {
            store,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            registry: LimiterRegistry::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_registry(mut self, registry: LimiterRegistry<C, O, R>) -> Self {
        self.registry = registry;
        self
    }

    /// Register a named limiter.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: impl RuleBuilder<C, O, R> + 'static,
    ) -> &mut Self {
        self.registry.register(name, builder);
        self
    }

    /// Look up a named limiter.
    pub fn limiter(&self, name: &str) -> Option<Arc<dyn RuleBuilder<C, O, R>>> {
        self.registry.limiter(name)
    }

    /// Resolve a named limiter against a request context.
    pub fn resolve(&self, name: &str, ctx: &C) -> Option<LimitOutcome<O, R>> {
        self.registry.limiter(name).map(|builder| builder.build(ctx))
    }

    pub fn registry(&self) -> &LimiterRegistry<C, O, R> {
        &self.registry
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn store_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    fn window_rule(
        &self,
        key: &str,
        max_attempts: u64,
        decay_seconds: u64,
    ) -> Result<WindowRule, LimiterError> {
        validate_max_attempts(max_attempts)?;
        validate_decay(decay_seconds)?;
        Ok(WindowRule::new(self.store_key(key), decay_seconds, max_attempts))
    }

    /// Record an attempt for `key` if it is under `max_attempts` per `decay_seconds`.
    ///
    /// Nothing is written when the key is already at its limit.
    pub async fn attempt(
        &self,
        key: &str,
        max_attempts: u64,
        decay_seconds: u64,
    ) -> Result<Decision, LimiterError> {
        let rule = self.window_rule(key, max_attempts, decay_seconds)?;

        if self.too_many_attempts(key, max_attempts, decay_seconds).await? {
            let wait = self.store.available_in(&rule).await?;
            // The blocking entry may have aged out between the two calls.
            if wait > 0 {
                tracing::debug!(key = %key, wait_seconds = wait, "Attempt rejected");
                return Ok(Decision::rejected(wait, max_attempts));
            }
        }

        let decision = self.store.attempt(&rule).await?;
        if !decision.successful() {
            tracing::debug!(key = %key, wait_seconds = decision.wait_seconds, "Attempt rejected");
        }
        Ok(decision)
    }

    /// Whether `key` has reached `max_attempts` within the window.
    pub async fn too_many_attempts(
        &self,
        key: &str,
        max_attempts: u64,
        decay_seconds: u64,
    ) -> Result<bool, LimiterError> {
        validate_max_attempts(max_attempts)?;
        Ok(self.attempts(key, decay_seconds).await? >= max_attempts)
    }

    /// Number of attempts recorded for `key` within the window.
    pub async fn attempts(&self, key: &str, decay_seconds: u64) -> Result<u64, LimiterError> {
        validate_decay(decay_seconds)?;
        Ok(self
            .store
            .attempts(&self.store_key(key), decay_seconds)
            .await?)
    }

    /// Attempts left for `key`. Negative when the key is already over the limit.
    pub async fn remaining(
        &self,
        key: &str,
        max_attempts: u64,
        decay_seconds: u64,
    ) -> Result<i64, LimiterError> {
        validate_max_attempts(max_attempts)?;
        let attempts = self.attempts(key, decay_seconds).await?;
        Ok(max_attempts as i64 - attempts as i64)
    }

    pub async fn retries_left(
        &self,
        key: &str,
        max_attempts: u64,
        decay_seconds: u64,
    ) -> Result<i64, LimiterError> {
        self.remaining(key, max_attempts, decay_seconds).await
    }

    /// Delete every attempt recorded for `key`. Returns whether there were any.
    pub async fn reset_attempts(&self, key: &str) -> Result<bool, LimiterError> {
        let removed = self.store.reset(&self.store_key(key)).await?;
        tracing::debug!(key = %key, removed, "Attempts reset");
        Ok(removed)
    }

    pub async fn clear(&self, key: &str) -> Result<(), LimiterError> {
        self.reset_attempts(key).await.map(|_| ())
    }

    /// Seconds until `key` accepts another attempt.
    pub async fn available_in(
        &self,
        key: &str,
        max_attempts: u64,
        decay_seconds: u64,
    ) -> Result<u64, LimiterError> {
        let rule = self.window_rule(key, max_attempts, decay_seconds)?;
        Ok(self.store.available_in(&rule).await?)
    }
}

impl<C, O: Clone, R> SlidingWindowRateLimiter<C, O, R> {
    /// Admit one request against several limits at once.
    ///
    /// Either every limit records the attempt or none does. The decision reports the
    /// first exceeded limit, or on success the limit with the least budget left, and
    /// carries that limit's response override.
    pub async fn attempt_limit_rules(
        &self,
        limits: &[Limit<O>],
    ) -> Result<RuleDecision<O>, LimiterError> {
        if limits.is_empty() {
            return Err(LimiterError::InvalidConfiguration(
                "At least one limit is required".to_string(),
            ));
        }

        let rules = limits
            .iter()
            .map(|limit| self.window_rule(&limit.key, limit.max_attempts, limit.decay_seconds))
            .collect::<Result<Vec<_>, _>>()?;

        let outcome = self.store.attempt_rules(&rules).await?;
        let limit = limits.get(outcome.rule_index).ok_or_else(|| {
            crate::ports::StoreError::Protocol(format!(
                "rule index {} out of range for {} limits",
                outcome.rule_index,
                limits.len()
            ))
        })?;

        if !outcome.decision.successful() {
            tracing::debug!(
                key = %limit.key,
                rule_index = outcome.rule_index,
                wait_seconds = outcome.decision.wait_seconds,
                "Request rejected by limit"
            );
        }

        Ok(RuleDecision {
            decision: outcome.decision,
            rule_index: outcome.rule_index,
            response_override: limit.response.clone(),
        })
    }
}

fn validate_max_attempts(max_attempts: u64) -> Result<(), LimiterError> {
    if max_attempts == 0 {
        return Err(LimiterError::InvalidConfiguration(
            "Unable to rate limit if max attempts equal to 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_decay(decay_seconds: u64) -> Result<(), LimiterError> {
    if decay_seconds == 0 {
        return Err(LimiterError::InvalidConfiguration(
            "Decay window must be at least one second".to_string(),
        ));
    }
    if decay_seconds > MAX_DECAY_SECONDS {
        return Err(LimiterError::InvalidConfiguration(format!(
            "Decay window of {} seconds exceeds the maximum of {}",
            decay_seconds, MAX_DECAY_SECONDS
        )));
    }
    Ok(())
}
