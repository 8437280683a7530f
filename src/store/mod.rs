//! Counter store abstraction and its implementations.
//!
//! The limiter keeps no counters itself. Every window record lives in a
//! shared key-value store that supports atomic increments and TTL expiry.

mod memory;
mod redis;

pub use self::memory::InMemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Outcome of [`CounterStore::increment_up_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Increment {
    /// The record was created or incremented; holds the new value.
    Applied(u64),
    /// The record is already at the ceiling; holds the unchanged value.
    Refused(u64),
}

/// Key-value operations the window limiter needs from its store.
///
/// Implementations must be safe to share across tasks. Each operation is
/// atomic per key; no operation spans more than one key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read a counter. `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Set a counter together with its time-to-live.
    async fn set_ex(&self, key: &str, ttl: Duration, value: u64) -> Result<()>;

    /// Atomically add `delta` and return the new value.
    ///
    /// A key without an expiry (absent and created from zero, or left
    /// persistent by an earlier writer) gets `ttl` in the same step. An
    /// existing expiry is never extended.
    async fn incr_by(&self, key: &str, delta: u64, ttl: Duration) -> Result<u64>;

    /// Atomically create the key with value 1 and `ttl` when absent, add one
    /// when its value is below `ceiling`, or leave the value untouched
    /// otherwise. A key found without an expiry gets `ttl` either way.
    async fn increment_up_to(&self, key: &str, ceiling: u64, ttl: Duration) -> Result<Increment>;
}
