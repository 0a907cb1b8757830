//! Memoization of value estimates.
//!
//! A run scores many partial trajectories; identical trajectory text reached through
//! different tree paths must reuse the first score. The cache is scoped to one run,
//! cleared at run start and never invalidated mid-run.

mod in_memory;

pub use in_memory::InMemoryCache;

use async_trait::async_trait;

/// Value cache keyed by exact trajectory text.
pub type ValueCache = InMemoryCache<String, f64>;

/// Append-only key-value cache.
#[async_trait]
pub trait Cache<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Clone + Send + Sync,
{
    /// Returns the cached value, counting a hit or a miss.
    async fn get(&self, key: &K) -> Option<V>;

    /// Stores a value. An existing entry is kept (first write wins).
    async fn set(&self, key: K, value: V);

    /// Stores `value` unless `key` is present; returns the value held afterwards.
    async fn get_or_insert(&self, key: K, value: V) -> V;

    /// Removes every entry and resets counters.
    async fn clear(&self);

    /// Number of entries.
    async fn len(&self) -> usize;
}
