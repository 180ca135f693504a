//! Redis window store: each window procedure is one Lua script.
//!
//! Windows are sorted sets scored by the whole second of Redis `TIME`; members are
//! seconds followed by zero-padded microseconds. Scripts are sent with `EVALSHA`
//! and reloaded transparently by [`redis::Script`] when the server has lost them.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};

use slidewin_core::domain::{Decision, RuleOutcome, WindowRule};
use slidewin_core::ports::{StoreError, WindowStore};

use crate::config::RedisConfig;

/// Helpers shared by every script.
const PRELUDE: &str = r#"
local function store_now()
    local t = redis.call('TIME')
    return tonumber(t[1]), t[1] .. string.format('%06d', tonumber(t[2]))
end

local function trimmed_count(key, now, window)
    redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
    return redis.call('ZCARD', key)
end

local function wait_seconds(key, now, window)
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    if oldest[2] == nil then
        return 0
    end
    return math.max(tonumber(oldest[2]) + window - now, 0)
end

local function record(key, now, member, window)
    redis.call('ZADD', key, now, member)
    redis.call('EXPIRE', key, window)
end
"#;

/// KEYS[1] window key; ARGV window seconds, max attempts.
/// Returns {wait, remaining, limit}.
const ATTEMPT: &str = r#"
local window = tonumber(ARGV[1])
local max_attempts = tonumber(ARGV[2])
local now, member = store_now()
local count = trimmed_count(KEYS[1], now, window)
if count >= max_attempts then
    return {wait_seconds(KEYS[1], now, window), 0, max_attempts}
end
record(KEYS[1], now, member, window)
return {0, max_attempts - count - 1, max_attempts}
"#;

/// KEYS one per rule; ARGV window seconds and max attempts per rule, in rule order.
/// Returns {wait, remaining, limit, zero-based rule index}.
const ATTEMPT_RULES: &str = r#"
local now, member = store_now()
local binding = 0
local min_left = -1
for i = 1, #KEYS do
    local window = tonumber(ARGV[i * 2 - 1])
    local max_attempts = tonumber(ARGV[i * 2])
    local count = trimmed_count(KEYS[i], now, window)
    if count >= max_attempts then
        return {wait_seconds(KEYS[i], now, window), 0, max_attempts, i - 1}
    end
    local left = max_attempts - count
    if min_left < 0 or left < min_left then
        min_left = left
        binding = i
    end
end
for i = 1, #KEYS do
    record(KEYS[i], now, member, tonumber(ARGV[i * 2 - 1]))
end
return {0, min_left - 1, tonumber(ARGV[binding * 2]), binding - 1}
"#;

/// KEYS[1] window key; ARGV window seconds. Returns the trimmed count.
const ATTEMPTS: &str = r#"
local now = store_now()
return trimmed_count(KEYS[1], now, tonumber(ARGV[1]))
"#;

/// KEYS[1] window key; ARGV window seconds, max attempts. Returns seconds to wait.
const AVAILABLE_IN: &str = r#"
local window = tonumber(ARGV[1])
local now = store_now()
if trimmed_count(KEYS[1], now, window) >= tonumber(ARGV[2]) then
    return wait_seconds(KEYS[1], now, window)
end
return 0
"#;

fn script(body: &str) -> Script {
    Script::new(&format!("{PRELUDE}{body}"))
}

fn store_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Operation(e.to_string())
    }
}

fn decision_from(reply: &[i64]) -> Result<Decision, StoreError> {
    match reply {
        [wait, remaining, limit, ..] => Ok(Decision {
            wait_seconds: (*wait).max(0) as u64,
            remaining: *remaining,
            limit: (*limit).max(0) as u64,
        }),
        _ => Err(StoreError::Protocol(format!(
            "expected at least 3 integers, got {:?}",
            reply
        ))),
    }
}

/// Redis-backed window store.
///
/// Uses connection manager for automatic reconnection; clones share one multiplexed
/// connection.
pub struct RedisWindowStore {
    conn: ConnectionManager,
    attempt: Script,
    attempt_rules: Script,
    attempts: Script,
    available_in: Script,
}

impl RedisWindowStore {
    pub async fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let client =
            Client::open(config.url.as_str()).map_err(|e| StoreError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Connection("Connection timed out".to_string()))?
            .map_err(store_error)?;

        tracing::info!(url = %config.url, "Connected to Redis window store");

        Ok(Self {
            conn,
            attempt: script(ATTEMPT),
            attempt_rules: script(ATTEMPT_RULES),
            attempts: script(ATTEMPTS),
            available_in: script(AVAILABLE_IN),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(&RedisConfig::from_env()).await
    }
}

#[async_trait]
impl WindowStore for RedisWindowStore {
    async fn attempt(&self, rule: &WindowRule) -> Result<Decision, StoreError> {
        let mut conn = self.conn.clone();

        let reply: Vec<i64> = self
            .attempt
            .key(&rule.key)
            .arg(rule.window_seconds)
            .arg(rule.max_attempts)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        decision_from(&reply)
    }

    async fn attempt_rules(&self, rules: &[WindowRule]) -> Result<RuleOutcome, StoreError> {
        if rules.is_empty() {
            return Ok(RuleOutcome {
                decision: Decision::accepted(0, 0),
                rule_index: 0,
            });
        }

        let mut conn = self.conn.clone();
        let mut invocation = self.attempt_rules.prepare_invoke();
        for rule in rules {
            invocation
                .key(&rule.key)
                .arg(rule.window_seconds)
                .arg(rule.max_attempts);
        }

        let reply: Vec<i64> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        let decision = decision_from(&reply)?;
        let rule_index = match reply.get(3) {
            Some(index) if *index >= 0 && (*index as usize) < rules.len() => *index as usize,
            other => {
                return Err(StoreError::Protocol(format!(
                    "rule index {:?} out of range for {} rules",
                    other,
                    rules.len()
                )));
            }
        };

        Ok(RuleOutcome {
            decision,
            rule_index,
        })
    }

    async fn attempts(&self, key: &str, window_seconds: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();

        self.attempts
            .key(key)
            .arg(window_seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)
    }

    async fn available_in(&self, rule: &WindowRule) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();

        let wait: i64 = self
            .available_in
            .key(&rule.key)
            .arg(rule.window_seconds)
            .arg(rule.max_attempts)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;

        Ok(wait.max(0) as u64)
    }

    async fn reset(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();

        let removed: i64 = conn.del(key).await.map_err(store_error)?;
        Ok(removed > 0)
    }
}
