//! # Slidewin Core
//!
//! Sliding-window-log admission for distributed rate limiting.
//! This crate holds the window engine, the ports a backing store must implement,
//! and the [`SlidingWindowRateLimiter`] facade. It has no infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod limiter;
pub mod ports;
pub mod registry;

pub use domain::{Decision, Limit, LimitOutcome, RuleDecision, StoreTime};
pub use error::LimiterError;
pub use limiter::{DEFAULT_KEY_PREFIX, MAX_DECAY_SECONDS, SlidingWindowRateLimiter};
pub use registry::{LimiterRegistry, RuleBuilder};
