//! In-process window ledger with sorted-set and TTL semantics.

use std::collections::{BTreeSet, HashMap};

use super::{StoreTime, WindowLogs};

#[derive(Debug, Default)]
struct KeyLog {
    entries: BTreeSet<(i64, String)>,
    expires_at: Option<StoreTime>,
}

/// Window logs for many keys, held in process memory.
///
/// Keys behave like Redis sorted sets: a key whose deadline has passed, or whose
/// last entry was trimmed, no longer exists. The ledger has no clock of its own;
/// the owner moves it forward with [`LogBook::advance`].
#[derive(Debug, Default)]
pub struct LogBook {
    keys: HashMap<String, KeyLog>,
    now: Option<StoreTime>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current time used for key expiry.
    pub fn advance(&mut self, now: StoreTime) {
        self.now = Some(now);
    }

    fn is_expired(&self, log: &KeyLog) -> bool {
        match (log.expires_at, self.now) {
            (Some(deadline), Some(now)) => deadline <= now,
            _ => false,
        }
    }

    fn live(&self, key: &str) -> Option<&KeyLog> {
        self.keys.get(key).filter(|log| !self.is_expired(log))
    }

    fn live_mut(&mut self, key: &str) -> Option<&mut KeyLog> {
        if self.keys.get(key).is_some_and(|log| self.is_expired(log)) {
            self.keys.remove(key);
        }
        self.keys.get_mut(key)
    }

    /// Delete a key. Returns whether it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        self.live_mut(key).is_some() && self.keys.remove(key).is_some()
    }

    /// Drop every expired key.
    pub fn sweep(&mut self) -> usize {
        let Some(now) = self.now else {
            return 0;
        };
        let before = self.keys.len();
        self.keys
            .retain(|_, log| log.expires_at.is_none_or(|deadline| deadline > now));
        before - self.keys.len()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.keys.values().filter(|log| !self.is_expired(log)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WindowLogs for LogBook {
    fn trim(&mut self, key: &str, horizon: i64) {
        let Some(log) = self.live_mut(key) else {
            return;
        };
        log.entries.retain(|(score, _)| *score > horizon);
        if log.entries.is_empty() {
            self.keys.remove(key);
        }
    }

    fn count(&self, key: &str) -> u64 {
        self.live(key).map_or(0, |log| log.entries.len() as u64)
    }

    fn oldest_score(&self, key: &str) -> Option<i64> {
        self.live(key)?.entries.first().map(|(score, _)| *score)
    }

    fn insert(&mut self, key: &str, score: i64, member: String) {
        if self.live_mut(key).is_none() {
            self.keys.insert(key.to_string(), KeyLog::default());
        }
        let Some(log) = self.keys.get_mut(key) else {
            return;
        };

        let existing = log.entries.iter().find(|(_, m)| *m == member).cloned();
        if let Some(existing) = existing {
            log.entries.remove(&existing);
        }
        log.entries.insert((score, member));
    }

    fn expire_at(&mut self, key: &str, deadline: StoreTime) {
        if let Some(log) = self.live_mut(key) {
            log.expires_at = Some(deadline);
        }
    }
}
