//! In-memory window store - used as fallback when Redis is unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use slidewin_core::StoreTime;
use slidewin_core::domain::{Decision, LogBook, RuleOutcome, WindowRule, window};
use slidewin_core::ports::{Clock, StoreError, SystemClock, WindowStore};

/// Expired keys are swept after this many operations.
const SWEEP_EVERY: u64 = 1024;

#[derive(Default)]
struct State {
    book: LogBook,
    last_issued: Option<StoreTime>,
    ops: u64,
}

impl State {
    /// Next store timestamp, strictly after the previous one so entry members stay unique.
    fn tick(&mut self, reading: StoreTime) -> StoreTime {
        let now = match self.last_issued {
            Some(last) if reading <= last => last.plus(Duration::from_micros(1)),
            _ => reading,
        };
        self.last_issued = Some(now);
        now
    }
}

/// In-memory window store running the window engine under one async mutex.
///
/// The mutex makes each procedure atomic, like a script on the Redis side.
/// Note: Windows are per-process, not shared across instances.
pub struct InMemoryWindowStore {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Run `f` against the ledger at the current store time, atomically.
    async fn with_book<T>(&self, f: impl FnOnce(&mut LogBook, StoreTime) -> T) -> T {
        let mut state = self.state.lock().await;
        let now = state.tick(self.clock.now());
        state.book.advance(now);

        state.ops += 1;
        if state.ops % SWEEP_EVERY == 0 {
            let swept = state.book.sweep();
            if swept > 0 {
                tracing::trace!(swept, "Swept expired window keys");
            }
        }

        f(&mut state.book, now)
    }

    /// Number of live keys held.
    pub async fn len(&self) -> usize {
        self.with_book(|book, _| book.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn attempt(&self, rule: &WindowRule) -> Result<Decision, StoreError> {
        Ok(self
            .with_book(|book, now| window::attempt(book, now, rule))
            .await)
    }

    async fn attempt_rules(&self, rules: &[WindowRule]) -> Result<RuleOutcome, StoreError> {
        Ok(self
            .with_book(|book, now| window::attempt_all(book, now, rules))
            .await)
    }

    async fn attempts(&self, key: &str, window_seconds: u64) -> Result<u64, StoreError> {
        Ok(self
            .with_book(|book, now| window::attempts(book, now, key, window_seconds))
            .await)
    }

    async fn available_in(&self, rule: &WindowRule) -> Result<u64, StoreError> {
        Ok(self
            .with_book(|book, now| window::available_in(book, now, rule))
            .await)
    }

    async fn reset(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.with_book(|book, _| book.delete(key)).await)
    }
}
