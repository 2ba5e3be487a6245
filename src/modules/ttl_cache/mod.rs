//! Small TTL cache with get-or-compute semantics.
//!
//! Sits in front of HEAD resolution so bursts of lookups for the same base URL
//! share one answer for a while, independently of the per-process memo.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Twelve hours, the lifetime of a cached HEAD answer.
pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 60 * 60);

struct CacheEntry<V> {
    value: V,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl<V: Clone> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }

    fn get(&self) -> Option<V> {
        self.is_live().then(|| self.value.clone())
    }
}

/// Keyed cache whose entries expire after a fixed TTL. Cloning shares storage.
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    ttl: Duration,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            ttl: self.ttl,
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(key).and_then(CacheEntry::get))
    }

    pub fn insert(&self, key: K, value: V) {
        if let Ok(mut map) = self.entries.write() {
            map.retain(|_, entry| entry.is_live());
            map.insert(key, CacheEntry::new(value, self.ttl));
        }
    }

    /// Cached value for `key`, or the result of `compute` which is then cached.
    /// No lock is held while `compute` runs.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(&key) {
            return value;
        }

        let value = compute().await;
        self.insert(key, value.clone());
        value
    }

    pub fn invalidate(&self, key: &K) {
        if let Ok(mut map) = self.entries.write() {
            map.remove(key);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.entries.write() {
            map.clear();
        }
    }
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn computes_once_within_ttl() {
        let cache: TtlCache<String, u16> = TtlCache::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute("https://a.example".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    200
                })
                .await;
            assert_eq!(value, 200);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(Duration::from_millis(20));
        cache.insert("k", 1);
        assert_eq!(cache.get(&"k"), Some(1));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get(&"k"), None);
        assert_eq!(cache.get_or_compute("k", || async { 2 }).await, 2);
    }

    #[test]
    fn huge_ttl_never_expires() {
        let cache: TtlCache<&'static str, u32> = TtlCache::new(Duration::MAX);
        cache.insert("k", 7);
        cache.insert("other", 8);
        assert_eq!(cache.get(&"k"), Some(7));
    }

    #[test]
    fn clones_share_entries() {
        let cache: TtlCache<u8, u8> = TtlCache::default();
        let other = cache.clone();
        cache.insert(1, 10);
        assert_eq!(other.get(&1), Some(10));
        other.invalidate(&1);
        assert_eq!(cache.get(&1), None);
    }
}
