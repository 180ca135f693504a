//! Store-side timestamps.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamp read from the store's clock, at microsecond resolution.
///
/// Ordering is by seconds, then microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreTime {
    pub secs: i64,
    pub micros: u32,
}

impl StoreTime {
    pub fn new(secs: i64, micros: u32) -> Self {
        debug_assert!(micros < 1_000_000);
        Self { secs, micros }
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            secs: at.timestamp(),
            micros: at.timestamp_subsec_micros().min(999_999),
        }
    }

    /// The member text recorded for an entry taken at this instant.
    pub fn member(&self) -> String {
        format!("{}{:06}", self.secs, self.micros)
    }

    /// Entries scored at or before this second fall out of a window of `window_secs`.
    pub fn trim_horizon(&self, window_secs: u64) -> i64 {
        self.secs.saturating_sub(clamp_secs(window_secs))
    }

    pub fn plus(&self, elapsed: Duration) -> Self {
        let total = self.micros as u64 + elapsed.subsec_micros() as u64;
        Self {
            secs: self
                .secs
                .saturating_add(clamp_secs(elapsed.as_secs()))
                .saturating_add((total / 1_000_000) as i64),
            micros: (total % 1_000_000) as u32,
        }
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        self.plus(Duration::from_secs(secs))
    }
}

/// Seconds as a signed offset, saturating at `i64::MAX`.
pub(crate) fn clamp_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_pads_micros() {
        assert_eq!(StoreTime::new(1_700_000_000, 42).member(), "1700000000000042");
    }

    #[test]
    fn test_plus_carries_into_seconds() {
        let t = StoreTime::new(10, 900_000).plus(Duration::from_millis(250));
        assert_eq!(t, StoreTime::new(11, 150_000));
    }

    #[test]
    fn test_trim_horizon() {
        assert_eq!(StoreTime::new(100, 5).trim_horizon(10), 90);
    }

    #[test]
    fn test_huge_offsets_saturate() {
        let now = StoreTime::new(1_700_000_000, 0);
        assert_eq!(now.trim_horizon(u64::MAX), 1_700_000_000 - i64::MAX);
        assert_eq!(now.plus_secs(u64::MAX).secs, i64::MAX);
    }
}
