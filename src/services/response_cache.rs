//! Time-to-live cache for results of expensive upstream calls.
//!
//! Expired entries are treated as absent and evicted when read. Nothing
//! coordinates concurrent misses on the same key, so two callers may both
//! compute and `set` the value; the later write wins.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::CacheEntry;

#[derive(Debug)]
pub struct ResponseCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
}

impl<T> Default for ResponseCache<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> ResponseCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<T> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                return Some(entry.value.clone());
            }
        } else {
            return None;
        }

        // Re-check under the write lock so a concurrent `set` is not dropped.
        if self.entries.remove_if(key, |_, entry| !entry.is_fresh(now)).is_some() {
            debug!(key, "evicted expired cache entry");
        }
        None
    }

    /// Store `value` until `now + ttl`, replacing any previous entry.
    ///
    /// A zero `ttl` leaves an entry that is already expired. A `ttl` too large
    /// to represent as an instant never expires.
    pub fn set(&self, key: &str, value: T, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn set_at(&self, key: &str, value: T, ttl: Duration, now: Instant) {
        let entry = CacheEntry {
            value,
            expires_at: now.checked_add(ttl),
        };
        self.entries.insert(key.to_string(), entry);
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
