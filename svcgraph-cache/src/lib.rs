//! A concurrency-safe cache with per-entry expiry, used to deduplicate graph writes.
//!
//! Entries are evicted lazily: an expired entry stays in memory until it is looked up again or
//! overwritten. There is no background sweep.
//!
//! ```
//! use std::time::Duration;
//! use svcgraph_cache::DedupCache;
//!
//! let cache = DedupCache::new();
//! assert!(cache.insert_if_absent("checkout-checkout-billing", (), Duration::from_secs(600)));
//! assert!(!cache.insert_if_absent("checkout-checkout-billing", (), Duration::from_secs(600)));
//! ```

#![warn(missing_docs)]

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// A source of the current time in unix seconds.
pub trait Clock {
    /// Returns the current unix timestamp in seconds.
    fn now(&self) -> i64;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    /// Unix timestamp in seconds after which the entry is stale.
    expires_at: i64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at < now
    }
}

/// A map from string keys to values that expire after a time to live.
#[derive(Debug)]
pub struct DedupCache<V, C = SystemClock> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    clock: C,
}

impl<V> DedupCache<V> {
    /// Creates an empty cache using the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl<V> Default for DedupCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, C: Clock> DedupCache<V, C> {
    /// Creates an empty cache with a custom time source.
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Stores a value that expires after `ttl`, replacing any previous entry.
    ///
    /// A `ttl` shorter than one second does not store anything.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let Some(expires_at) = self.expiry(ttl) else {
            return;
        };

        self.entries
            .lock()
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Stores a value unless a live entry already exists for the key.
    ///
    /// Returns `true` if the value was stored. The lookup and the insert happen under the same
    /// lock, so of two concurrent calls with the same key at most one succeeds.
    pub fn insert_if_absent(&self, key: impl Into<String>, value: V, ttl: Duration) -> bool {
        let Some(expires_at) = self.expiry(ttl) else {
            return false;
        };

        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let key = key.into();

        if let Some(entry) = entries.get(&key)
            && !entry.is_expired(now)
        {
            return false;
        }

        entries.insert(key, CacheEntry { value, expires_at });
        true
    }

    /// Removes an entry.
    pub fn delete(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the number of stored entries, including expired entries not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn expiry(&self, ttl: Duration) -> Option<i64> {
        let ttl = i64::try_from(ttl.as_secs()).ok().filter(|&secs| secs > 0)?;
        Some(self.clock.now().saturating_add(ttl))
    }
}

impl<V: Clone, C: Clock> DedupCache<V, C> {
    /// Returns a clone of the value if the entry exists and has not expired.
    ///
    /// An expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }
}
