//! Time source for stores that keep their own clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;

use crate::domain::StoreTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> StoreTime;
}

/// Wall clock of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> StoreTime {
        StoreTime::from_datetime(Utc::now())
    }
}

/// A clock that only moves when told to. Used to drive windows in tests.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
}

impl ManualClock {
    pub fn new(start: StoreTime) -> Self {
        Self {
            micros: AtomicI64::new(start.secs * 1_000_000 + start.micros as i64),
        }
    }

    pub fn at_secs(secs: i64) -> Self {
        Self::new(StoreTime::new(secs, 0))
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as i64, Ordering::SeqCst);
    }

    pub fn set(&self, to: StoreTime) {
        self.micros
            .store(to.secs * 1_000_000 + to.micros as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> StoreTime {
        let micros = self.micros.load(Ordering::SeqCst);
        StoreTime::new(micros.div_euclid(1_000_000), micros.rem_euclid(1_000_000) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_secs(100);
        clock.advance(Duration::from_millis(1_500));
        assert_eq!(clock.now(), StoreTime::new(101, 500_000));

        clock.set(StoreTime::new(7, 3));
        assert_eq!(clock.now(), StoreTime::new(7, 3));
    }
}
