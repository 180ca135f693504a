//! Rate limit rules and what a named limiter resolves to.

/// One sliding-window rule: at most `max_attempts` per `decay_seconds` for `key`.
///
/// `O` is an opaque response override handed back to the caller when this rule
/// rejects a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Limit<O = ()> {
    pub key: String,
    pub max_attempts: u64,
    pub decay_seconds: u64,
    pub response: Option<O>,
}

impl<O> Limit<O> {
    pub const MINUTE: u64 = 60;
    pub const HOUR: u64 = 3600;
    pub const DAY: u64 = 86400;

    pub fn new(key: impl Into<String>, max_attempts: u64, decay_seconds: u64) -> Self {
        Self {
            key: key.into(),
            max_attempts,
            decay_seconds,
            response: None,
        }
    }

    pub fn per_minute(max_attempts: u64) -> Self {
        Self::new("", max_attempts, Self::MINUTE)
    }

    pub fn per_minutes(decay_minutes: u64, max_attempts: u64) -> Self {
        Self::new("", max_attempts, decay_minutes.saturating_mul(Self::MINUTE))
    }

    pub fn per_seconds(decay_seconds: u64, max_attempts: u64) -> Self {
        Self::new("", max_attempts, decay_seconds)
    }

    pub fn per_hour(max_attempts: u64, decay_hours: u64) -> Self {
        Self::new("", max_attempts, decay_hours.saturating_mul(Self::HOUR))
    }

    pub fn per_day(max_attempts: u64, decay_days: u64) -> Self {
        Self::new("", max_attempts, decay_days.saturating_mul(Self::DAY))
    }

    /// Set the signature this limit is counted under.
    pub fn by(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Set the override used when this limit rejects a request.
    pub fn response(mut self, response: O) -> Self {
        self.response = Some(response);
        self
    }
}

/// What a named limiter resolves to for one request.
#[derive(Debug, Clone)]
pub enum LimitOutcome<O = (), R = ()> {
    /// Admit against all of these limits at once.
    Limits(Vec<Limit<O>>),
    /// Skip rate limiting entirely.
    Unlimited,
    /// Answer the request directly with this response.
    Response(R),
}

impl<O, R> LimitOutcome<O, R> {
    pub fn none() -> Self {
        LimitOutcome::Unlimited
    }
}

impl<O, R> From<Limit<O>> for LimitOutcome<O, R> {
    fn from(limit: Limit<O>) -> Self {
        LimitOutcome::Limits(vec![limit])
    }
}

impl<O, R> From<Vec<Limit<O>>> for LimitOutcome<O, R> {
    fn from(limits: Vec<Limit<O>>) -> Self {
        LimitOutcome::Limits(limits)
    }
}
