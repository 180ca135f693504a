//! # Slidewin Infrastructure
//!
//! Concrete [`WindowStore`](slidewin_core::ports::WindowStore) implementations.
//!
//! ## Feature Flags
//!
//! - `redis` (default) - Redis store running the window procedures as Lua scripts
//! - `minimal` - No external dependencies, in-memory store only

pub mod config;
pub mod store;

pub use config::RedisConfig;
pub use store::InMemoryWindowStore;

#[cfg(feature = "redis")]
pub use store::RedisWindowStore;
