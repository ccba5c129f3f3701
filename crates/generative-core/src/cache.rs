//! Synthesis cache
//!
//! Maps a [`Fingerprint`] of (unit, call) to the accepted source produced for
//! it. Backends are pluggable through [`CodeCache`]; [`MemoryCache`] keeps
//! entries in a moka cache.

use crate::config::EngineConfig;
use crate::error::CacheError;
use async_trait::async_trait;
use generative_artifact::{CacheEntry, CallContext, Fingerprint, UnitId};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Storage for accepted source, keyed by fingerprint
#[async_trait]
pub trait CodeCache: Send + Sync {
    /// Whether an entry exists for `key`
    async fn contains(&self, key: &Fingerprint) -> bool;

    /// Stored source for `key`
    async fn get(&self, key: &Fingerprint) -> Option<String>;

    /// Store `entry`, replacing any previous entry for its fingerprint
    ///
    /// # Errors
    /// Returns [`CacheError`] when the backend refuses the write
    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError>;
}

/// Statistics for cache performance monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// In-memory cache with optional TTL
#[derive(Debug, Clone)]
pub struct MemoryCache {
    inner: Cache<Fingerprint, Arc<CacheEntry>>,
}

impl MemoryCache {
    /// Create new cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Create cache with time-based expiration
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Cache sized and expired per `config`
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        match config.cache_ttl() {
            Some(ttl) => Self::with_ttl(config.cache_capacity, ttl),
            None => Self::new(config.cache_capacity),
        }
    }

    /// Full stored entry for `key`
    #[inline]
    pub async fn entry(&self, key: &Fingerprint) -> Option<Arc<CacheEntry>> {
        self.inner.get(key).await
    }

    /// Invalidate cache entry
    #[inline]
    pub async fn invalidate(&self, key: &Fingerprint) {
        self.inner.invalidate(key).await;
    }

    /// Invalidate all entries
    #[inline]
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Get cache statistics
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }

    /// Flush pending maintenance so counts are exact
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl Default for MemoryCache {
    /// Create cache with default capacity (10,000 entries)
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CodeCache for MemoryCache {
    async fn contains(&self, key: &Fingerprint) -> bool {
        self.inner.contains_key(key)
    }

    async fn get(&self, key: &Fingerprint) -> Option<String> {
        self.inner
            .get(key)
            .await
            .map(|entry| entry.generated_code.clone())
    }

    async fn set(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.inner.insert(entry.fingerprint, Arc::new(entry)).await;
        Ok(())
    }
}

/// Cached source for `unit` called with `call`
///
/// # Errors
/// Returns [`CacheError::Fingerprint`] when the call cannot be hashed
pub async fn lookup(
    cache: &dyn CodeCache,
    unit: &UnitId,
    call: &CallContext,
) -> Result<Option<String>, CacheError> {
    let key = Fingerprint::compute(unit, call)?;
    if !cache.contains(&key).await {
        return Ok(None);
    }
    Ok(cache.get(&key).await)
}

/// Store accepted `source` for `unit` called with `call`
///
/// # Errors
/// Returns [`CacheError`] when hashing or the backend write fails
pub async fn store(
    cache: &dyn CodeCache,
    unit: &UnitId,
    call: &CallContext,
    source: &str,
) -> Result<(), CacheError> {
    let key = Fingerprint::compute(unit, call)?;
    cache.set(CacheEntry::new(key, unit, call, source)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: &str = "def add(a, b):\n    return sum([a, b])\n";

    #[tokio::test]
    async fn store_then_lookup() {
        let cache = MemoryCache::default();
        let unit = UnitId::new("add");
        let call = CallContext::positional([3, 4]);

        assert_eq!(lookup(&cache, &unit, &call).await.unwrap(), None);
        store(&cache, &unit, &call, ADD).await.unwrap();
        assert_eq!(lookup(&cache, &unit, &call).await.unwrap().as_deref(), Some(ADD));

        let other = CallContext::positional([4, 3]);
        assert_eq!(lookup(&cache, &unit, &other).await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_snapshot_the_call() {
        let cache = MemoryCache::new(10);
        let unit = UnitId::scoped("Calc", "add");
        let call = CallContext::positional([1]).kwarg("b", 2);
        store(&cache, &unit, &call, ADD).await.unwrap();

        let key = Fingerprint::compute(&unit, &call).unwrap();
        let entry = cache.entry(&key).await.unwrap();
        assert_eq!(entry.unit_name, "Calc.add");
        assert_eq!(entry.args, call.args());
        assert_eq!(&entry.kwargs, call.kwargs());
    }

    #[tokio::test]
    async fn last_writer_wins() {
        let cache = MemoryCache::default();
        let unit = UnitId::new("f");
        let call = CallContext::new();
        store(&cache, &unit, &call, "def f():\n    return 1\n").await.unwrap();
        store(&cache, &unit, &call, "def f():\n    return 2\n").await.unwrap();
        let source = lookup(&cache, &unit, &call).await.unwrap().unwrap();
        assert!(source.contains("return 2"));

        cache.sync().await;
        assert_eq!(cache.stats().entry_count, 1);
        cache.invalidate_all();
        cache.sync().await;
        assert_eq!(cache.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn ttl_expires_entries() {
        let cache = MemoryCache::with_ttl(10, Duration::from_millis(50));
        let unit = UnitId::new("f");
        let call = CallContext::new();
        store(&cache, &unit, &call, "def f():\n    return 1\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(lookup(&cache, &unit, &call).await.unwrap(), None);
    }
}
