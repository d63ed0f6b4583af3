//! Rate caching with LRU eviction and TTL expiry.
//!
//! Entries are keyed by the *requested* calendar date but remember the date
//! the feed actually returned, so a weekend request keeps hitting the cache
//! even though its rate is dated the previous Friday.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use currate_common::{Clock, Currency, SystemClock};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A cache hit: the per-unit rate and the date it belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedRate {
    pub rate: f64,
    pub actual_date: NaiveDate,
}

/// Rate storage used by the converter.
pub trait RateStore: Send + Sync {
    /// Look up a rate by currency and requested date.
    fn get(&self, currency: Currency, date: NaiveDate) -> Option<CachedRate>;

    /// Store a rate under `requested_date`, remembering `actual_date`.
    fn set(&self, currency: Currency, requested_date: NaiveDate, rate: f64, actual_date: NaiveDate);

    /// Drop every entry.
    fn clear(&self);
}

/// Store that never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl RateStore for NoopCache {
    fn get(&self, _currency: Currency, _date: NaiveDate) -> Option<CachedRate> {
        None
    }

    fn set(&self, _currency: Currency, _requested_date: NaiveDate, _rate: f64, _actual_date: NaiveDate) {}

    fn clear(&self) {}
}

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Maximum number of entries. Must be positive.
    pub max_entries: usize,
    /// Lifetime of an entry, counted from its last write.
    pub ttl: Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    currency: Currency,
    date: NaiveDate,
}

#[derive(Debug)]
struct CacheEntry {
    key: CacheKey,
    rate: f64,
    actual_date: NaiveDate,
    written_at: DateTime<Utc>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Slab of entries threaded on a recency list.
///
/// `head` is the least recently used entry, `tail` the most recent.
#[derive(Debug, Default)]
struct CacheInner {
    index: HashMap<CacheKey, usize>,
    slots: Vec<Option<CacheEntry>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheInner {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn entry(&self, idx: usize) -> &CacheEntry {
        self.slots[idx].as_ref().expect("linked cache slot is occupied")
    }

    fn entry_mut(&mut self, idx: usize) -> &mut CacheEntry {
        self.slots[idx].as_mut().expect("linked cache slot is occupied")
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let entry = self.entry(idx);
            (entry.prev, entry.next)
        };

        match prev {
            Some(p) => self.entry_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.entry_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let entry = self.entry_mut(idx);
        entry.prev = None;
        entry.next = None;
    }

    fn push_back(&mut self, idx: usize) {
        let old_tail = self.tail;
        {
            let entry = self.entry_mut(idx);
            entry.prev = old_tail;
            entry.next = None;
        }
        match old_tail {
            Some(t) => self.entry_mut(t).next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    fn touch(&mut self, idx: usize) {
        if self.tail != Some(idx) {
            self.unlink(idx);
            self.push_back(idx);
        }
    }

    fn insert(&mut self, entry: CacheEntry) {
        let key = entry.key;
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(entry);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.push_back(idx);
    }

    fn remove(&mut self, idx: usize) -> CacheEntry {
        self.unlink(idx);
        let entry = self.slots[idx].take().expect("linked cache slot is occupied");
        self.index.remove(&entry.key);
        self.free.push(idx);
        entry
    }

    fn evict_oldest(&mut self) -> Option<CacheKey> {
        let head = self.head?;
        let entry = self.remove(head);
        self.evictions += 1;
        Some(entry.key)
    }

    fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }
}

/// Bounded, thread-safe rate cache with LRU eviction and TTL expiry.
///
/// `get` takes the write lock because a hit reorders the recency list;
/// `len` and `stats` only need the read lock.
#[derive(Debug)]
pub struct LruRateCache {
    inner: RwLock<CacheInner>,
    config: RateCacheConfig,
    clock: Arc<dyn Clock>,
}

impl LruRateCache {
    /// Create a cache holding at most `max_entries` rates for `ttl` each.
    ///
    /// # Panics
    ///
    /// Panics if `max_entries` is zero.
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self::with_config(RateCacheConfig { max_entries, ttl })
    }

    /// Create a new rate cache with custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_entries` is zero.
    pub fn with_config(config: RateCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache that reads time from `clock`.
    ///
    /// # Panics
    ///
    /// Panics if `config.max_entries` is zero.
    pub fn with_clock(config: RateCacheConfig, clock: Arc<dyn Clock>) -> Self {
        assert!(config.max_entries > 0, "cache: max_entries must be positive");
        Self {
            inner: RwLock::new(CacheInner::with_capacity(config.max_entries)),
            config,
            clock,
        }
    }

    /// Remove a single entry. Returns whether it was present.
    pub fn remove(&self, currency: Currency, date: NaiveDate) -> bool {
        let key = CacheKey { currency, date };
        let mut inner = self.inner.write();
        match inner.index.get(&key).copied() {
            Some(idx) => {
                inner.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Whether an entry exists for the key, expired or not. Does not touch
    /// the recency order.
    pub fn contains(&self, currency: Currency, date: NaiveDate) -> bool {
        self.inner
            .read()
            .index
            .contains_key(&CacheKey { currency, date })
    }

    /// Get the number of entries in cache.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            entries: inner.len(),
            capacity: self.config.max_entries,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

impl Default for LruRateCache {
    fn default() -> Self {
        Self::with_config(RateCacheConfig::default())
    }
}

impl RateStore for LruRateCache {
    fn get(&self, currency: Currency, date: NaiveDate) -> Option<CachedRate> {
        let key = CacheKey { currency, date };
        let mut inner = self.inner.write();

        let Some(idx) = inner.index.get(&key).copied() else {
            inner.misses += 1;
            debug!(%currency, %date, "Cache miss");
            return None;
        };

        if self.clock.elapsed_since(inner.entry(idx).written_at) > self.config.ttl {
            inner.remove(idx);
            inner.misses += 1;
            debug!(%currency, %date, "Cache entry expired");
            return None;
        }

        inner.touch(idx);
        inner.hits += 1;
        let entry = inner.entry(idx);
        debug!(%currency, %date, actual_date = %entry.actual_date, "Cache hit");
        Some(CachedRate {
            rate: entry.rate,
            actual_date: entry.actual_date,
        })
    }

    fn set(&self, currency: Currency, requested_date: NaiveDate, rate: f64, actual_date: NaiveDate) {
        let key = CacheKey {
            currency,
            date: requested_date,
        };
        let now = self.clock.now();
        let mut inner = self.inner.write();

        if let Some(idx) = inner.index.get(&key).copied() {
            let entry = inner.entry_mut(idx);
            entry.rate = rate;
            entry.actual_date = actual_date;
            entry.written_at = now;
            inner.touch(idx);
            return;
        }

        if inner.len() >= self.config.max_entries {
            if let Some(evicted) = inner.evict_oldest() {
                debug!(
                    currency = %evicted.currency,
                    date = %evicted.date,
                    "Evicted least recently used rate"
                );
            }
        }

        inner.insert(CacheEntry {
            key,
            rate,
            actual_date,
            written_at: now,
            prev: None,
            next: None,
        });
    }

    fn clear(&self) {
        self.inner.write().clear();
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}
