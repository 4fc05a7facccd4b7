//! In-memory TTL cache for facet counts.
//!
//! Stores per-value counts keyed by `(fingerprint, category, key)` and whole
//! aggregate snapshots keyed by fingerprint. An expired entry is
//! indistinguishable from a miss.
//!
//! Time is read from [`tokio::time::Instant`], so tests can pause the runtime
//! clock and advance it past the TTL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use tally_core::{defaults, FacetCategory, FacetCountsSnapshot, Fingerprint};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CountKey {
    fingerprint: Fingerprint,
    category: FacetCategory,
    key: String,
}

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    stored_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T, now: Instant) -> Self {
        Self {
            value,
            stored_at: now,
        }
    }

    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Facet count cache. Cloning shares the underlying store.
#[derive(Clone)]
pub struct FacetCache {
    inner: Arc<FacetCacheInner>,
}

struct FacetCacheInner {
    ttl: Duration,
    counts: RwLock<HashMap<CountKey, CacheEntry<u64>>>,
    snapshots: RwLock<HashMap<Fingerprint, CacheEntry<Arc<FacetCountsSnapshot>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Lookups that found an entry past its TTL (also counted as misses).
    pub expired: u64,
    /// Stored count entries, fresh or not.
    pub entries: usize,
    /// Stored snapshots, fresh or not.
    pub snapshots: usize,
}

impl Default for FacetCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FacetCache {
    /// Create a cache with the default 5 minute TTL.
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(defaults::CACHE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(FacetCacheInner {
                ttl,
                counts: RwLock::new(HashMap::new()),
                snapshots: RwLock::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                expired: AtomicU64::new(0),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Cached count, or `None` when absent or expired.
    pub fn get(
        &self,
        fingerprint: &Fingerprint,
        category: FacetCategory,
        key: &str,
    ) -> Option<u64> {
        let lookup = CountKey {
            fingerprint: fingerprint.clone(),
            category,
            key: key.to_string(),
        };
        let counts = self.inner.counts.read().unwrap_or_else(PoisonError::into_inner);
        let found = counts
            .get(&lookup)
            .map(|e| (e.value, e.is_fresh(self.inner.ttl, Instant::now())));
        drop(counts);

        match found {
            Some((value, true)) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                trace!(
                    fingerprint = %fingerprint.short(),
                    %category,
                    key,
                    value,
                    "Count cache HIT"
                );
                Some(value)
            }
            Some((_, false)) => {
                self.inner.expired.fetch_add(1, Ordering::Relaxed);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                trace!(fingerprint = %fingerprint.short(), %category, key, "Count cache EXPIRED");
                None
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a count stamped with the current time, replacing any prior entry.
    pub fn set(&self, fingerprint: &Fingerprint, category: FacetCategory, key: &str, count: u64) {
        let entry = CacheEntry::new(count, Instant::now());
        self.inner
            .counts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                CountKey {
                    fingerprint: fingerprint.clone(),
                    category,
                    key: key.to_string(),
                },
                entry,
            );
    }

    /// Cached aggregate snapshot for a fingerprint, if still fresh.
    pub fn get_snapshot(&self, fingerprint: &Fingerprint) -> Option<Arc<FacetCountsSnapshot>> {
        let snapshots = self.inner.snapshots.read().unwrap_or_else(PoisonError::into_inner);
        let found = snapshots
            .get(fingerprint)
            .map(|e| (e.value.clone(), e.is_fresh(self.inner.ttl, Instant::now())));
        drop(snapshots);

        match found {
            Some((snapshot, true)) => {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %fingerprint.short(), "Snapshot cache HIT");
                Some(snapshot)
            }
            Some((_, false)) => {
                self.inner.expired.fetch_add(1, Ordering::Relaxed);
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %fingerprint.short(), "Snapshot cache EXPIRED");
                None
            }
            None => {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %fingerprint.short(), "Snapshot cache MISS");
                None
            }
        }
    }

    /// Store an aggregate snapshot and every count it carries.
    pub fn put_snapshot(&self, fingerprint: &Fingerprint, snapshot: Arc<FacetCountsSnapshot>) {
        let now = Instant::now();
        {
            let mut counts = self.inner.counts.write().unwrap_or_else(PoisonError::into_inner);
            for category in snapshot.categories() {
                let Some(facet) = snapshot.get(category) else {
                    continue;
                };
                for (key, count) in facet.key_counts() {
                    counts.insert(
                        CountKey {
                            fingerprint: fingerprint.clone(),
                            category,
                            key,
                        },
                        CacheEntry::new(count, now),
                    );
                }
            }
        }
        self.inner
            .snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(fingerprint.clone(), CacheEntry::new(snapshot, now));
    }

    /// Forget the snapshot for one fingerprint (counts stay).
    pub fn invalidate_snapshot(&self, fingerprint: &Fingerprint) {
        self.inner
            .snapshots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(fingerprint);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let removed_counts = {
            let mut counts = self.inner.counts.write().unwrap_or_else(PoisonError::into_inner);
            let n = counts.len();
            counts.clear();
            n
        };
        let removed_snapshots = {
            let mut snapshots = self
                .inner
                .snapshots
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let n = snapshots.len();
            snapshots.clear();
            n
        };
        info!(removed_counts, removed_snapshots, "Facet cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            expired: self.inner.expired.load(Ordering::Relaxed),
            entries: self.inner.counts.read().unwrap_or_else(PoisonError::into_inner).len(),
            snapshots: self
                .inner
                .snapshots
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tally_core::{fingerprint, FacetCountEntry, FacetCounts, FilterSpec, ResultMode};

    fn fp(search: &str) -> Fingerprint {
        fingerprint(&FilterSpec::new(ResultMode::Scenes).with_search(search))
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set_hits() {
        let cache = FacetCache::new();
        let key = fp("a");
        cache.set(&key, FacetCategory::Tags, "5", 12);
        assert_eq!(cache.get(&key, FacetCategory::Tags, "5"), Some(12));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let cache = FacetCache::new();
        let key = fp("a");
        cache.set(&key, FacetCategory::Tags, "5", 12);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get(&key, FacetCategory::Tags, "5"), Some(12));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get(&key, FacetCategory::Tags, "5"), None);

        let stats = cache.stats();
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.misses, 1);
        // Expired entries are not proactively deleted.
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_restamps() {
        let cache = FacetCache::with_ttl(Duration::from_secs(10));
        let key = fp("a");
        cache.set(&key, FacetCategory::Studios, "1", 1);
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set(&key, FacetCategory::Studios, "1", 2);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(cache.get(&key, FacetCategory::Studios, "1"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_scoped_by_fingerprint_and_category() {
        let cache = FacetCache::new();
        cache.set(&fp("a"), FacetCategory::Tags, "5", 12);
        assert_eq!(cache.get(&fp("b"), FacetCategory::Tags, "5"), None);
        assert_eq!(cache.get(&fp("a"), FacetCategory::Performers, "5"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_round_trip_populates_counts() {
        let cache = FacetCache::new();
        let key = fp("a");
        let mut facets = BTreeMap::new();
        facets.insert(
            FacetCategory::Tags,
            FacetCounts::from_entries([FacetCountEntry::new("5", Some("Blonde".into()), 12)]),
        );
        let snapshot = Arc::new(FacetCountsSnapshot::new(ResultMode::Scenes, key.clone(), facets));
        cache.put_snapshot(&key, snapshot.clone());

        let cached = cache.get_snapshot(&key).unwrap();
        assert!(Arc::ptr_eq(&cached, &snapshot));
        assert_eq!(cache.get(&key, FacetCategory::Tags, "5"), Some(12));

        tokio::time::advance(cache.ttl()).await;
        assert!(cache.get_snapshot(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_everything() {
        let cache = FacetCache::new();
        let key = fp("a");
        cache.set(&key, FacetCategory::Tags, "5", 12);
        cache.put_snapshot(
            &key,
            Arc::new(FacetCountsSnapshot::new(ResultMode::Scenes, key.clone(), BTreeMap::new())),
        );
        cache.clear();

        assert_eq!(cache.get(&key, FacetCategory::Tags, "5"), None);
        assert!(cache.get_snapshot(&key).is_none());
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.snapshots, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_storage() {
        let cache = FacetCache::new();
        let other = cache.clone();
        cache.set(&fp("a"), FacetCategory::Tags, "1", 3);
        assert_eq!(other.get(&fp("a"), FacetCategory::Tags, "1"), Some(3));
    }
}
