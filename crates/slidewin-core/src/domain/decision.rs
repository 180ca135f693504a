//! Admission decisions returned by the window engine.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one admission check.
///
/// `wait_seconds == 0` with `remaining >= 0` means the attempt was accepted.
/// A positive `wait_seconds` is the number of seconds until the oldest blocking
/// entry leaves the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub wait_seconds: u64,
    pub remaining: i64,
    pub limit: u64,
}

impl Decision {
    pub fn accepted(remaining: i64, limit: u64) -> Self {
        Self {
            wait_seconds: 0,
            remaining,
            limit,
        }
    }

    pub fn rejected(wait_seconds: u64, limit: u64) -> Self {
        Self {
            wait_seconds,
            remaining: 0,
            limit,
        }
    }

    pub fn successful(&self) -> bool {
        self.remaining >= 0 && self.wait_seconds == 0
    }

    /// Epoch seconds at which another attempt may succeed.
    pub fn available_at(&self) -> i64 {
        self.available_at_from(Utc::now())
    }

    pub fn available_at_from(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp() + self.wait_seconds as i64
    }
}

/// Decision of a multi-rule admission, tagged with the rule it reports on.
///
/// On rejection `rule_index` names the first exceeded rule; on acceptance it names
/// the binding rule. `response_override` is that rule's override, if it had one.
#[derive(Debug, Clone)]
pub struct RuleDecision<O = ()> {
    pub decision: Decision,
    pub rule_index: usize,
    pub response_override: Option<O>,
}

impl<O> RuleDecision<O> {
    pub fn successful(&self) -> bool {
        self.decision.successful()
    }

    pub fn available_at(&self) -> i64 {
        self.decision.available_at()
    }
}
