//! Fixed-window request counters keyed by client identity.
//!
//! The store is a sharded concurrent map. Each increment-or-reset runs while
//! the shard guard for its key is held, so calls for the same key are
//! linearizable and calls that land in different shards never contend.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Default upper bound on the number of distinct keys tracked at once.
///
/// A full store refuses new keys and the limiter lets those requests through
/// (fail open), so a client spraying distinct keys can push later newcomers
/// past the limit until the sweeper evicts idle counters. Keys already
/// tracked stay enforced. Size this well above the number of clients active
/// within `retention_multiple` windows.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 100_000;

/// Errors raised by the counter store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("counter store is full ({tracked} keys tracked), refusing new key")]
    CapacityExhausted { tracked: usize },
}

/// Request count for one key in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub count: u64,
    /// Milliseconds since the UNIX epoch.
    pub window_start: u64,
}

impl Counter {
    fn fresh(now: u64) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    fn is_expired(&self, now: u64, window_millis: u64) -> bool {
        // A clock that stepped backwards keeps the current window alive.
        now.saturating_sub(self.window_start) >= window_millis
    }

    fn hit(&mut self, now: u64, window_millis: u64) -> WindowHit {
        if self.is_expired(now, window_millis) {
            *self = Counter::fresh(now);
        } else {
            self.count = self.count.saturating_add(1);
        }
        WindowHit {
            count: self.count,
            window_start: self.window_start,
        }
    }
}

/// Result of [`WindowCounterStore::increment_and_get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Count after this request was recorded.
    pub count: u64,
    /// Start of the window the request was counted in.
    pub window_start: u64,
}

/// Concurrent key to [`Counter`] map. All mutation goes through
/// [`increment_and_get`](Self::increment_and_get), [`remove`](Self::remove)
/// and [`sweep`](Self::sweep).
#[derive(Debug)]
pub struct WindowCounterStore {
    counters: DashMap<String, Counter>,
    /// Number of entries in `counters`, kept alongside the map so the
    /// capacity check never walks every shard.
    tracked: AtomicUsize,
    max_keys: usize,
}

impl WindowCounterStore {
    pub fn new(max_keys: usize) -> Self {
        Self {
            counters: DashMap::new(),
            tracked: AtomicUsize::new(0),
            max_keys: max_keys.max(1),
        }
    }

    /// Record one request for `key` at `now` and return the post-increment
    /// count together with the start of the window it was counted in.
    ///
    /// Starts a fresh window (count 1) when the key is unknown or its window
    /// of `window_seconds` has elapsed.
    pub fn increment_and_get(
        &self,
        key: &str,
        now: u64,
        window_seconds: u64,
    ) -> Result<WindowHit, StoreError> {
        let window_millis = window_seconds.saturating_mul(1000);

        // Hot path: known key, no allocation for the owned map key.
        if let Some(mut counter) = self.counters.get_mut(key) {
            return Ok(counter.hit(now, window_millis));
        }

        // Another caller may have inserted the key since `get_mut` returned.
        let hit = match self.counters.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => occupied.get_mut().hit(now, window_millis),
            Entry::Vacant(vacant) => {
                self.reserve_slot()?;
                vacant.insert(Counter::fresh(now));
                WindowHit {
                    count: 1,
                    window_start: now,
                }
            }
        };
        Ok(hit)
    }

    /// Snapshot of one key's counter.
    pub fn get(&self, key: &str) -> Option<Counter> {
        self.counters.get(key).map(|counter| *counter)
    }

    /// Forget a key, returning its last counter.
    pub fn remove(&self, key: &str) -> Option<Counter> {
        let (_, counter) = self.counters.remove(key)?;
        self.tracked.fetch_sub(1, Ordering::AcqRel);
        Some(counter)
    }

    /// Drop every counter whose window started `retention_millis` or more
    /// before `now`. Returns the number of evicted keys.
    pub fn sweep(&self, now: u64, retention_millis: u64) -> usize {
        let mut evicted = 0;
        self.counters.retain(|_, counter| {
            let keep = now.saturating_sub(counter.window_start) < retention_millis;
            if !keep {
                evicted += 1;
            }
            keep
        });
        self.tracked.fetch_sub(evicted, Ordering::AcqRel);
        evicted
    }

    pub fn len(&self) -> usize {
        self.tracked.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Claim room for one more key, or fail if the store is full.
    fn reserve_slot(&self) -> Result<(), StoreError> {
        self.tracked
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tracked| {
                (tracked < self.max_keys).then_some(tracked + 1)
            })
            .map(|_| ())
            .map_err(|tracked| StoreError::CapacityExhausted { tracked })
    }
}

impl Default for WindowCounterStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACKED_KEYS)
    }
}
