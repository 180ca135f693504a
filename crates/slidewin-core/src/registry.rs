//! Named limiter registry.
//!
//! Maps a limiter name to a [`RuleBuilder`] that decides, per request context,
//! which limits apply. The registry is an ordinary value: build it at startup and
//! hand it to the [`SlidingWindowRateLimiter`](crate::SlidingWindowRateLimiter).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::LimitOutcome;

/// Produces the limits for one request context `C`.
///
/// `O` is the response override type carried by limits, `R` the raw response type
/// a builder may answer with instead of limiting.
pub trait RuleBuilder<C, O = (), R = ()>: Send + Sync {
    fn build(&self, ctx: &C) -> LimitOutcome<O, R>;
}

impl<C, O, R, F> RuleBuilder<C, O, R> for F
where
    F: Fn(&C) -> LimitOutcome<O, R> + Send + Sync,
{
    fn build(&self, ctx: &C) -> LimitOutcome<O, R> {
        self(ctx)
    }
}

pub struct LimiterRegistry<C, O = (), R = ()> {
    builders: HashMap<String, Arc<dyn RuleBuilder<C, O, R>>>,
}

impl<C, O, R> LimiterRegistry<C, O, R> {
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Register a builder under `name`, replacing any previous one.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        builder: impl RuleBuilder<C, O, R> + 'static,
    ) -> &mut Self {
        let name = name.into();
        if self.builders.insert(name.clone(), Arc::new(builder)).is_some() {
            tracing::debug!(limiter = %name, "Replaced named limiter");
        }
        self
    }

    pub fn limiter(&self, name: &str) -> Option<Arc<dyn RuleBuilder<C, O, R>>> {
        self.builders.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl<C, O, R> Default for LimiterRegistry<C, O, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, O, R> fmt::Debug for LimiterRegistry<C, O, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimiterRegistry")
            .field("names", &self.builders.keys().collect::<Vec<_>>())
            .finish()
    }
}
