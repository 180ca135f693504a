//! The sliding-window-log admission engine.
//!
//! Every procedure here reads one store timestamp, evicts entries at or before the
//! trim horizon of each window, and then decides. Callers must run a procedure as one
//! atomic unit against the ledger: the Redis store does so with a Lua script, the
//! in-memory store under its lock. The Lua scripts in `slidewin-infra` follow these
//! functions step for step.

use super::time::clamp_secs;
use super::{Decision, StoreTime};

/// Ordered-set operations the engine needs from a store.
///
/// Scores are whole epoch seconds. Empty keys are indistinguishable from missing ones.
pub trait WindowLogs {
    /// Remove every entry scored at or before `horizon`.
    fn trim(&mut self, key: &str, horizon: i64);

    fn count(&self, key: &str) -> u64;

    fn oldest_score(&self, key: &str) -> Option<i64>;

    /// Insert `member` with `score`, re-scoring it if already present.
    fn insert(&mut self, key: &str, score: i64, member: String);

    /// Drop the whole key once `deadline` is reached.
    fn expire_at(&mut self, key: &str, deadline: StoreTime);
}

/// One key's window parameters, with the key already namespaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRule {
    pub key: String,
    pub window_seconds: u64,
    pub max_attempts: u64,
}

impl WindowRule {
    pub fn new(key: impl Into<String>, window_seconds: u64, max_attempts: u64) -> Self {
        Self {
            key: key.into(),
            window_seconds,
            max_attempts,
        }
    }
}

/// Decision of a multi-rule admission and the index of the rule it reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleOutcome {
    pub decision: Decision,
    pub rule_index: usize,
}

/// Trim `key` to its window and return how many entries remain.
pub fn attempts<L: WindowLogs + ?Sized>(
    logs: &mut L,
    now: StoreTime,
    key: &str,
    window_seconds: u64,
) -> u64 {
    logs.trim(key, now.trim_horizon(window_seconds));
    logs.count(key)
}

/// Seconds until the oldest entry of `key` leaves the window. Zero for an empty key.
fn wait_seconds<L: WindowLogs + ?Sized>(
    logs: &L,
    now: StoreTime,
    key: &str,
    window_seconds: u64,
) -> u64 {
    logs.oldest_score(key)
        .map(|oldest| {
            oldest
                .saturating_add(clamp_secs(window_seconds))
                .saturating_sub(now.secs)
                .max(0) as u64
        })
        .unwrap_or(0)
}

fn record<L: WindowLogs + ?Sized>(logs: &mut L, now: StoreTime, rule: &WindowRule) {
    logs.insert(&rule.key, now.secs, now.member());
    logs.expire_at(&rule.key, now.plus_secs(rule.window_seconds));
}

/// Single-key admission. Records an entry only when the attempt is accepted.
pub fn attempt<L: WindowLogs + ?Sized>(
    logs: &mut L,
    now: StoreTime,
    rule: &WindowRule,
) -> Decision {
    let count = attempts(logs, now, &rule.key, rule.window_seconds);

    if count >= rule.max_attempts {
        let wait = wait_seconds(logs, now, &rule.key, rule.window_seconds);
        return Decision::rejected(wait, rule.max_attempts);
    }

    record(logs, now, rule);
    Decision::accepted((rule.max_attempts - count - 1) as i64, rule.max_attempts)
}

/// Multi-rule admission for one request.
///
/// The first exceeded rule, in input order, rejects the whole request and nothing
/// is written. Otherwise every rule's key records the same entry, and the decision
/// reports the rule with the least remaining budget (first one wins ties).
pub fn attempt_all<L: WindowLogs + ?Sized>(
    logs: &mut L,
    now: StoreTime,
    rules: &[WindowRule],
) -> RuleOutcome {
    let mut binding: Option<(usize, u64)> = None;

    for (index, rule) in rules.iter().enumerate() {
        let count = attempts(logs, now, &rule.key, rule.window_seconds);

        if count >= rule.max_attempts {
            let wait = wait_seconds(logs, now, &rule.key, rule.window_seconds);
            return RuleOutcome {
                decision: Decision::rejected(wait, rule.max_attempts),
                rule_index: index,
            };
        }

        let left = rule.max_attempts - count;
        if binding.is_none_or(|(_, min_left)| left < min_left) {
            binding = Some((index, left));
        }
    }

    // An empty rule set admits trivially with nothing to report.
    let Some((rule_index, min_left)) = binding else {
        return RuleOutcome {
            decision: Decision::accepted(0, 0),
            rule_index: 0,
        };
    };

    for rule in rules {
        record(logs, now, rule);
    }

    RuleOutcome {
        decision: Decision::accepted(min_left as i64 - 1, rules[rule_index].max_attempts),
        rule_index,
    }
}

/// Seconds until `key` admits another attempt; zero when under the limit.
pub fn available_in<L: WindowLogs + ?Sized>(
    logs: &mut L,
    now: StoreTime,
    rule: &WindowRule,
) -> u64 {
    let count = attempts(logs, now, &rule.key, rule.window_seconds);

    if count >= rule.max_attempts {
        wait_seconds(logs, now, &rule.key, rule.window_seconds)
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LogBook;

    fn at(secs: i64) -> StoreTime {
        StoreTime::new(secs, 0)
    }

    #[test]
    fn test_single_key_accepts_then_rejects_then_recovers() {
        let mut book = LogBook::new();
        let rule = WindowRule::new("k", 10, 1);

        book.advance(at(100));
        assert_eq!(attempt(&mut book, at(100), &rule), Decision::accepted(0, 1));

        book.advance(at(103));
        assert_eq!(attempt(&mut book, at(103), &rule), Decision::rejected(7, 1));

        book.advance(at(110));
        assert_eq!(attempt(&mut book, at(110), &rule), Decision::accepted(0, 1));
    }

    #[test]
    fn test_huge_window_still_limits() {
        for window in [i64::MAX as u64, u64::MAX] {
            let mut book = LogBook::new();
            let rule = WindowRule::new("k", window, 1);

            book.advance(at(100));
            assert!(attempt(&mut book, at(100), &rule).successful());

            let decision = attempt(&mut book, at(101), &rule);
            assert!(!decision.successful());
            assert!(decision.wait_seconds > 0);
        }
    }

    #[test]
    fn test_entry_not_counted_at_horizon() {
        let mut book = LogBook::new();
        let rule = WindowRule::new("k", 5, 3);

        attempt(&mut book, at(50), &rule);
        attempt(&mut book, at(52), &rule);

        assert_eq!(attempts(&mut book, at(54), "k", 5), 2);
        assert_eq!(attempts(&mut book, at(55), "k", 5), 1);
        assert_eq!(attempts(&mut book, at(57), "k", 5), 0);
    }

    #[test]
    fn test_rejection_writes_nothing() {
        let mut book = LogBook::new();
        let rule = WindowRule::new("k", 60, 2);

        attempt(&mut book, at(1), &rule);
        attempt(&mut book, at(2), &rule);
        let before = attempts(&mut book, at(3), "k", 60);
        let decision = attempt(&mut book, at(3), &rule);

        assert!(!decision.successful());
        assert_eq!(decision.wait_seconds, 58);
        assert_eq!(attempts(&mut book, at(3), "k", 60), before);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut book = LogBook::new();
        let rule = WindowRule::new("k", 10, 4);

        for tick in 0..200 {
            let now = StoreTime::new(1_000 + tick / 7, (tick as u32 * 131) % 1_000_000);
            book.advance(now);
            attempt(&mut book, now, &rule);
            assert!(attempts(&mut book, now, "k", 10) <= 4);
        }
    }

    #[test]
    fn test_remaining_counts_down() {
        let mut book = LogBook::new();
        let rule = WindowRule::new("k", 100, 30);

        let first = attempt(&mut book, StoreTime::new(7, 1), &rule);
        let second = attempt(&mut book, StoreTime::new(7, 2), &rule);

        assert_eq!(first, Decision::accepted(29, 30));
        assert_eq!(second, Decision::accepted(28, 30));
    }

    #[test]
    fn test_multi_rule_binds_to_tightest() {
        let mut book = LogBook::new();
        let rules = vec![WindowRule::new("r1", 10, 2), WindowRule::new("r2", 100, 5)];

        let first = attempt_all(&mut book, StoreTime::new(500, 1), &rules);
        assert_eq!(first.decision, Decision::accepted(1, 2));
        assert_eq!(first.rule_index, 0);

        let second = attempt_all(&mut book, StoreTime::new(501, 1), &rules);
        assert_eq!(second.decision, Decision::accepted(0, 2));
        assert_eq!(second.rule_index, 0);

        let third = attempt_all(&mut book, StoreTime::new(502, 1), &rules);
        assert_eq!(third.rule_index, 0);
        assert_eq!(third.decision, Decision::rejected(8, 2));

        // The rejected request left no trace on the looser rule either.
        assert_eq!(attempts(&mut book, StoreTime::new(502, 2), "r2", 100), 2);
    }

    #[test]
    fn test_multi_rule_first_exceeded_wins() {
        let mut book = LogBook::new();
        let rules = vec![
            WindowRule::new("a", 10, 5),
            WindowRule::new("b", 10, 1),
            WindowRule::new("c", 10, 1),
        ];

        attempt_all(&mut book, at(10), &rules);
        let outcome = attempt_all(&mut book, at(11), &rules);

        assert_eq!(outcome.rule_index, 1);
        assert_eq!(outcome.decision, Decision::rejected(9, 1));
        assert_eq!(attempts(&mut book, at(11), "a", 10), 1);
    }

    #[test]
    fn test_multi_rule_tie_goes_to_first() {
        let mut book = LogBook::new();
        let rules = vec![WindowRule::new("x", 60, 3), WindowRule::new("y", 60, 3)];

        let outcome = attempt_all(&mut book, at(1), &rules);

        assert_eq!(outcome.rule_index, 0);
        assert_eq!(outcome.decision, Decision::accepted(2, 3));
    }

    #[test]
    fn test_multi_rule_reports_later_rule_when_tighter() {
        let mut book = LogBook::new();
        let rules = vec![WindowRule::new("loose", 60, 10), WindowRule::new("tight", 60, 2)];

        let outcome = attempt_all(&mut book, at(1), &rules);

        assert_eq!(outcome.rule_index, 1);
        assert_eq!(outcome.decision, Decision::accepted(1, 2));
    }

    #[test]
    fn test_available_in() {
        let mut book = LogBook::new();
        let rule = WindowRule::new("k", 10, 2);

        assert_eq!(available_in(&mut book, at(20), &rule), 0);
        attempt(&mut book, at(20), &rule);
        attempt(&mut book, at(21), &rule);
        assert_eq!(available_in(&mut book, at(21), &rule), 9);
        assert_eq!(available_in(&mut book, at(30), &rule), 0);
    }
}
