use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::ticker::{spawn_repeating, TaskHandle};

/// Share of entries dropped when the cache is full and nothing has expired
const EVICTION_DIVISOR: usize = 5;

struct CacheEntry<T> {
    value: T,
    inserted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    /// Insertion order for entries sharing a timestamp
    seq: u64,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Bounded TTL cache for aggregate query results.
///
/// Expired entries are dropped lazily on read and by the sweeper. When a new
/// key arrives at capacity, expired entries go first, then the oldest fifth
/// by insertion time.
pub struct ResultCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    default_ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> ResultCache<T> {
    pub fn new(max_entries: usize, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: DashMap::with_capacity(max_entries),
            default_ttl,
            max_entries,
            clock,
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.max_entries,
            config.ttl(),
            clock,
        )
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return true;
            }
        }

        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        false
    }

    pub fn set(&self, key: impl Into<String>, value: T) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        let now = self.clock.now();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room(now);
        }

        let entry = CacheEntry {
            value,
            inserted_at: now,
            expires_at: expiry(now, ttl),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        self.entries.insert(key, entry);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Entries currently held, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(self.clock.now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn make_room(&self, now: DateTime<Utc>) {
        let purged = self.purge_expired_at(now);
        if purged > 0 {
            debug!(purged, "purged expired cache entries at capacity");
        }

        let len = self.entries.len();
        if len < self.max_entries {
            return;
        }

        let mut by_age: Vec<(DateTime<Utc>, u64, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.inserted_at, entry.seq, entry.key().clone()))
            .collect();
        by_age.sort_unstable();

        let evict = (len / EVICTION_DIVISOR).max(1);
        for (_, _, key) in by_age.into_iter().take(evict) {
            self.entries.remove(&key);
        }
        debug!(evicted = evict, "evicted oldest cache entries");
    }

    /// Serve `key` from the cache or compute it with `fetch`. Only successful
    /// results are stored.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            debug!(key, "cache hit");
            return Ok(value);
        }

        debug!(key, "cache miss");
        let value = fetch().await?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Start the periodic purge of expired entries
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> TaskHandle {
        let cache = Arc::clone(self);
        spawn_repeating("cache-sweep", period, move || {
            let purged = cache.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = cache.len(), "cache sweep");
            }
        })
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn setup(max_entries: usize) -> (ResultCache<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let cache = ResultCache::new(
            max_entries,
            Duration::from_secs(300),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        (cache, clock)
    }

    #[test]
    fn test_get_returns_stored_value() {
        let (cache, _) = setup(50);
        cache.set("summary", 7);

        assert_eq!(cache.get("summary"), Some(7));
        assert!(cache.has("summary"));
        assert_eq!(cache.get("other"), None);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                entries: 1
            }
        );
    }

    #[test]
    fn test_zero_ttl_is_expired_on_next_read() {
        let (cache, _) = setup(50);
        cache.set_with_ttl("k", 1, Duration::ZERO);

        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_expired_entries_are_evicted_lazily() {
        let (cache, clock) = setup(50);
        cache.set("k", 1);

        clock.advance(TimeDelta::seconds(299));
        assert!(cache.has("k"));

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(cache.len(), 1);
        assert!(!cache.has("k"));
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_delete() {
        let (cache, _) = setup(50);
        cache.set("k", 1);

        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
        assert!(!cache.delete("missing"));
    }

    #[test]
    fn test_clear_empties_cache() {
        let (cache, _) = setup(50);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_full_cache_evicts_oldest_fifth() {
        let (cache, clock) = setup(10);
        for i in 0..10u32 {
            cache.set(format!("k{i}"), i);
            clock.advance(TimeDelta::seconds(1));
        }
        // Reading old entries must not protect them
        assert_eq!(cache.get("k0"), Some(0));

        cache.set("k10", 10);

        assert_eq!(cache.len(), 9);
        assert!(!cache.has("k0"));
        assert!(!cache.has("k1"));
        assert!(cache.has("k2"));
        assert!(cache.has("k10"));
    }

    #[test]
    fn test_same_timestamp_evicts_in_insertion_order() {
        let (cache, _) = setup(5);
        for i in 0..5u32 {
            cache.set(format!("k{i}"), i);
        }
        cache.set("k5", 5);

        assert!(!cache.has("k0"));
        assert!(cache.has("k1"));
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn test_full_cache_prefers_purging_expired() {
        let (cache, clock) = setup(10);
        for i in 0..3u32 {
            cache.set_with_ttl(format!("short{i}"), i, Duration::from_secs(10));
        }
        for i in 0..7u32 {
            cache.set(format!("long{i}"), i);
        }

        clock.advance(TimeDelta::seconds(11));
        cache.set("new", 99);

        assert_eq!(cache.len(), 8);
        for i in 0..7 {
            assert!(cache.has(&format!("long{i}")));
        }
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, _) = setup(3);
        cache.set("a", 1);
        cache.set("b", 2);
        cache.set("c", 3);
        cache.set("b", 20);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), Some(20));
    }

    #[test]
    fn test_purge_expired_counts_removed() {
        let (cache, clock) = setup(50);
        cache.set_with_ttl("a", 1, Duration::from_secs(5));
        cache.set_with_ttl("b", 2, Duration::from_secs(5));
        cache.set("c", 3);

        clock.advance(TimeDelta::seconds(6));
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_or_insert_caches_only_success() {
        let (cache, _) = setup(50);

        let failed: Result<u32, String> = cache
            .get_or_try_insert_with("k", || async { Err("source down".to_string()) })
            .await;
        assert_eq!(failed, Err("source down".to_string()));
        assert!(!cache.has("k"));

        let fetched: Result<u32, String> = cache.get_or_try_insert_with("k", || async { Ok(42) }).await;
        assert_eq!(fetched, Ok(42));

        let cached: Result<u32, String> = cache
            .get_or_try_insert_with("k", || async { Err("should be served from cache".to_string()) })
            .await;
        assert_eq!(cached, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_purges_without_reads() {
        let (cache, clock) = setup(50);
        let cache = Arc::new(cache);
        cache.set_with_ttl("stale", 1, Duration::from_secs(30));
        cache.set("fresh", 2);

        let sweeper = cache.spawn_sweeper(Duration::from_secs(60));
        clock.advance(TimeDelta::seconds(31));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(cache.len(), 1);

        sweeper.stop().await;
    }
}
