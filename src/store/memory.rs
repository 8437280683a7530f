//! In-memory counter store.
//!
//! Mirrors the Redis semantics the limiter relies on (TTL expiry, increments
//! that arm a TTL on keys lacking one) so it can stand in for Redis in tests
//! and single-node deployments. Time is read from `tokio::time`, which
//! lets tests drive expiry with a paused clock.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{CounterStore, Increment};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct Slot {
    value: u64,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }

    /// Give a persistent slot an expiry; an existing one is kept.
    fn arm(&mut self, at: Instant) {
        if self.expires_at.is_none() {
            self.expires_at = Some(at);
        }
    }
}

/// A `DashMap`-backed store with lazy expiry.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    slots: DashMap<String, Slot>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time-to-live of a live key, `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|slot| slot.is_live(now)).count()
    }

    /// Whether the store holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a value with no expiry, as a plain `SET` would.
    #[cfg(test)]
    pub(crate) fn set_persistent(&self, key: &str, value: u64) {
        self.slots.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: None,
            },
        );
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let now = Instant::now();
        let value = self
            .slots
            .get(key)
            .filter(|slot| slot.is_live(now))
            .map(|slot| slot.value);

        if value.is_none() {
            self.slots.remove_if(key, |_, slot| !slot.is_live(now));
        }
        Ok(value)
    }

    async fn set_ex(&self, key: &str, ttl: Duration, value: u64) -> Result<()> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: u64, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        let fresh = Slot {
            value: delta,
            expires_at: Some(now + ttl),
        };

        let value = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.is_live(now) {
                    slot.value += delta;
                    slot.arm(now + ttl);
                } else {
                    *slot = fresh;
                }
                slot.value
            }
            Entry::Vacant(vacant) => vacant.insert(fresh).value,
        };
        Ok(value)
    }

    async fn increment_up_to(&self, key: &str, ceiling: u64, ttl: Duration) -> Result<Increment> {
        let now = Instant::now();
        let fresh = Slot {
            value: 1,
            expires_at: Some(now + ttl),
        };

        let outcome = match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if !slot.is_live(now) {
                    *slot = fresh;
                    Increment::Applied(1)
                } else {
                    slot.arm(now + ttl);
                    if slot.value < ceiling {
                        slot.value += 1;
                        Increment::Applied(slot.value)
                    } else {
                        Increment::Refused(slot.value)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Increment::Applied(1)
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_absent_key() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("request_count:nobody").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ex_expires() {
        let store = InMemoryStore::new();
        store.set_ex("k", Duration::from_secs(60), 1).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(1));
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get("k").await.unwrap(), Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_by_keeps_existing_ttl() {
        let store = InMemoryStore::new();
        store.set_ex("k", Duration::from_secs(10), 1).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(store.incr_by("k", 1, Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_by_on_missing_key_arms_ttl() {
        let store = InMemoryStore::new();
        assert_eq!(store.incr_by("k", 3, Duration::from_secs(5)).await.unwrap(), 3);
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_by_arms_ttl_on_persistent_key() {
        let store = InMemoryStore::new();
        store.set_persistent("k", 4);
        assert_eq!(store.ttl("k"), None);

        assert_eq!(store.incr_by("k", 1, Duration::from_secs(30)).await.unwrap(), 5);
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_by_after_expiry_starts_over() {
        let store = InMemoryStore::new();
        store.set_ex("k", Duration::from_secs(1), 7).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.incr_by("k", 1, Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(60)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_up_to_stops_at_ceiling() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.increment_up_to("k", 2, ttl).await.unwrap(), Increment::Applied(1));
        assert_eq!(store.increment_up_to("k", 2, ttl).await.unwrap(), Increment::Applied(2));
        assert_eq!(store.increment_up_to("k", 2, ttl).await.unwrap(), Increment::Refused(2));
        assert_eq!(store.increment_up_to("k", 2, ttl).await.unwrap(), Increment::Refused(2));
        assert_eq!(store.get("k").await.unwrap(), Some(2));

        tokio::time::advance(ttl).await;
        assert_eq!(store.increment_up_to("k", 2, ttl).await.unwrap(), Increment::Applied(1));
        assert_eq!(store.ttl("k"), Some(ttl));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_increment_arms_ttl_on_persistent_key() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set_persistent("k", 2);

        assert_eq!(store.increment_up_to("k", 2, ttl).await.unwrap(), Increment::Refused(2));
        assert_eq!(store.ttl("k"), Some(ttl));

        tokio::time::advance(ttl).await;
        assert_eq!(store.increment_up_to("k", 2, ttl).await.unwrap(), Increment::Applied(1));
    }
}
