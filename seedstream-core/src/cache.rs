//! TTL-bounded query cache
//!
//! Caches expensive lookups under a normalized string key. Entries expire
//! after a fixed time-to-live and the cache holds at most `capacity`
//! entries, evicting the oldest insertion first. Reads use `peek` so a hit
//! never refreshes an entry's position.

use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Cached value with its insertion time.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// Query cache keyed by an explicit key-derivation function.
///
/// `Q` is the query type; the key function turns it into the normalized
/// string the entry is stored under, so equivalent queries share an entry.
pub struct QueryCache<Q: ?Sized, V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    key_fn: fn(&Q) -> String,
    ttl: Duration,
}

impl<Q: ?Sized, V: Clone> QueryCache<Q, V> {
    /// Creates a cache holding at most `capacity` entries for `ttl`.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(key_fn: fn(&Q) -> String, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            key_fn,
            ttl,
        }
    }

    /// Returns the normalized key for a query.
    pub fn key_for(&self, query: &Q) -> String {
        (self.key_fn)(query)
    }

    /// Returns a fresh cached value, dropping it if it has expired.
    pub fn get(&self, query: &Q) -> Option<V> {
        let key = self.key_for(query);
        let mut entries = self.entries.lock();

        match entries.peek(&key) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                tracing::debug!("Query cache hit: {}", key);
                Some(entry.value.clone())
            }
            Some(_) => {
                tracing::debug!("Query cache entry expired: {}", key);
                entries.pop(&key);
                None
            }
            None => None,
        }
    }

    /// Stores a value, evicting the oldest entry when full.
    pub fn insert(&self, query: &Q, value: V) {
        let key = self.key_for(query);
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };

        let mut entries = self.entries.lock();
        // Re-inserting moves the key to the newest position
        entries.pop(&key);
        if let Some((evicted, _)) = entries.push(key, entry) {
            tracing::debug!("Query cache evicted oldest entry: {}", evicted);
        }
    }

    /// Returns the cached value or runs `fetch` and caches its success.
    ///
    /// The lock is not held while `fetch` runs, so two concurrent misses for
    /// the same key may both fetch; the later insert wins.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `fetch`; failures are not cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, query: &Q, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(query) {
            return Ok(value);
        }

        let value = fetch().await?;
        self.insert(query, value.clone());
        Ok(value)
    }

    /// Number of stored entries, including ones that expired but were not read yet.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<Q: ?Sized, V> fmt::Debug for QueryCache<Q, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.entries.lock().len())
            .field("ttl", &self.ttl)
            .finish()
    }
}
