//! In-memory cache implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use super::Cache;

/// In-memory cache over a `HashMap` behind a `tokio::sync::RwLock`.
///
/// Entries never expire. Hit and miss counters are atomics so concurrent expansions
/// can share one cache.
///
/// # Example
///
/// ```rust,ignore
/// use stepwise::cache::{Cache, ValueCache};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = ValueCache::new();
///     cache.set("Step 1: x\n".to_string(), 0.7).await;
///     assert_eq!(cache.get(&"Step 1: x\n".to_string()).await, Some(0.7));
///     assert_eq!(cache.counters(), (1, 0));
/// }
/// ```
pub struct InMemoryCache<K, V> {
    data: RwLock<HashMap<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns (hits, misses) since creation or the last clear.
    pub fn counters(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl<K, V> Default for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl<K, V> Cache<K, V> for InMemoryCache<K, V>
where
    K: std::hash::Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Option<V> {
        let data = self.data.read().await;
        match data.get(key) {
            Some(v) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(v.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    async fn set(&self, key: K, value: V) {
        let mut data = self.data.write().await;
        data.entry(key).or_insert(value);
    }

    async fn get_or_insert(&self, key: K, value: V) -> V {
        let mut data = self.data.write().await;
        data.entry(key).or_insert(value).clone()
    }

    async fn clear(&self) {
        let mut data = self.data.write().await;
        data.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    async fn len(&self) -> usize {
        self.data.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_cache_basic() {
        let cache: InMemoryCache<String, f64> = InMemoryCache::new();
        assert_eq!(cache.get(&"key".to_string()).await, None);

        cache.set("key".to_string(), 0.25).await;
        assert_eq!(cache.get(&"key".to_string()).await, Some(0.25));
        assert_eq!(cache.counters(), (1, 1));
    }

    #[tokio::test]
    async fn test_in_memory_cache_first_write_wins() {
        let cache: InMemoryCache<String, f64> = InMemoryCache::new();
        cache.set("key".to_string(), 0.25).await;
        cache.set("key".to_string(), 0.75).await;
        assert_eq!(cache.get(&"key".to_string()).await, Some(0.25));
    }

    #[tokio::test]
    async fn test_in_memory_cache_get_or_insert_returns_stored() {
        let cache: InMemoryCache<String, f64> = InMemoryCache::new();
        assert_eq!(cache.get_or_insert("key".to_string(), 0.25).await, 0.25);
        assert_eq!(cache.get_or_insert("key".to_string(), 0.75).await, 0.25);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_in_memory_cache_clear() {
        let cache: InMemoryCache<String, f64> = InMemoryCache::new();
        cache.set("key1".to_string(), 0.1).await;
        cache.set("key2".to_string(), 0.2).await;
        let _ = cache.get(&"key1".to_string()).await;
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.counters(), (0, 0));
        assert_eq!(cache.get(&"key2".to_string()).await, None);
    }
}
