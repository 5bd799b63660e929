use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{FutureExt, Shared};
use parking_lot::Mutex;
use runtime::BoxFuture;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryState {
    InFlight,
    Ready,
}

pub type SharedResult<V> = Shared<BoxFuture<'static, V>>;

/// Memoizing single-flight cache of async computations.
///
/// The first request for a key starts the computation; every later request,
/// whether it arrives while the computation is in flight or after it has
/// finished, gets a clone of the same shared future. Nothing is recomputed
/// until the key is invalidated.
///
/// Entries are keyed in a `BTreeMap` for stable traversal order.
pub struct SingleFlightCache<V: Clone> {
    entries: Mutex<BTreeMap<CacheKey, SharedResult<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> Default for SingleFlightCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> SingleFlightCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared computation for `key`, starting it with `start` on a miss.
    ///
    /// `start` runs with the cache locked and must only build the future, not poll it.
    pub fn get_or_start<F>(&self, key: CacheKey, start: F) -> SharedResult<V>
    where
        F: FnOnce() -> BoxFuture<'static, V>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key.0, "single-flight cache hit");
            return existing.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let shared = start().shared();
        entries.insert(key, shared.clone());
        shared
    }

    pub fn state(&self, key: &CacheKey) -> Option<EntryState> {
        self.entries.lock().get(key).map(|f| {
            if f.peek().is_some() {
                EntryState::Ready
            } else {
                EntryState::InFlight
            }
        })
    }

    /// Forgets `key` so the next request recomputes it. In-flight clones keep running.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
