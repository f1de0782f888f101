// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Concurrent key → value cache with per-entry expiry.
//!
//! Expired entries are removed lazily when read, and in bulk by
//! [`ExpiringCache::sweep_expired`], which a periodic sweeper calls so keys
//! that are never read again do not accumulate.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use super::owner_of;
use crate::scheduler::PeriodicTask;

/// Default TTL for ordinary reads.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
/// TTL applied right after a write.
pub const SHORT_TTL: Duration = Duration::from_secs(30);

/// A cached value with its timing metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Entry counts reported by [`ExpiringCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries still within their TTL
    pub live: usize,
    /// Entries past their TTL but not yet removed
    pub expired: usize,
}

/// Thread-safe expiring cache. All operations are total.
///
/// # Example
///
/// ```
/// use progression_sync::ExpiringCache;
/// use std::time::Duration;
///
/// let cache: ExpiringCache<u32> = ExpiringCache::new(Duration::from_secs(60), Duration::from_secs(5));
/// cache.put("player_p1", 3);
/// assert_eq!(cache.get("player_p1"), Some(3));
///
/// cache.put("exists_p1", 1);
/// assert_eq!(cache.invalidate_owner("p1"), 2);
/// assert!(cache.is_empty());
/// ```
pub struct ExpiringCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    short_ttl: Duration,
}

impl<V: Clone + Send + Sync + 'static> ExpiringCache<V> {
    pub fn new(default_ttl: Duration, short_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            short_ttl,
        }
    }

    /// Store with the default TTL.
    pub fn put(&self, key: impl Into<String>, value: V) {
        self.put_with_ttl(key, value, self.default_ttl);
    }

    /// Store with the short TTL; used right after a write.
    pub fn put_short_lived(&self, key: impl Into<String>, value: V) {
        self.put_with_ttl(key, value, self.short_ttl);
    }

    pub fn put_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(key.into(), CacheEntry::new(value, ttl));
    }

    /// Value if present and not expired. An expired entry is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => {
                crate::metrics::record_cache_lookup("hit");
                return Some(entry.value.clone());
            }
            Some(_) => {}
            None => {
                crate::metrics::record_cache_lookup("miss");
                return None;
            }
        };

        // Re-check under the shard lock: a concurrent put may have refreshed it.
        self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
        crate::metrics::record_cache_lookup("expired");
        None
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Whether a live entry exists. Expired entries are removed.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now),
            None => return false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
        }
        !expired
    }

    /// Remove every key namespaced under `owner` (`<namespace>_<owner>`).
    /// Returns the number of removed entries.
    pub fn invalidate_owner(&self, owner: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| owner_of(key) != Some(owner));
        let removed = before.saturating_sub(self.entries.len());
        debug!(owner, removed, "Invalidated owner cache entries");
        removed
    }

    /// Rewrite the expiry of a live entry to `now + ttl`. No-op if absent.
    pub fn set_ttl(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let Some(mut entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.is_expired_at(now) {
            return false;
        }
        entry.expires_at = now + ttl;
        true
    }

    /// Purge all expired entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before.saturating_sub(self.entries.len());
        crate::metrics::record_cache_sweep(removed);
        crate::metrics::set_cache_entries(self.entries.len());
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let expired = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .count();
        CacheStats {
            live: self.entries.len().saturating_sub(expired),
            expired,
        }
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    #[must_use]
    pub fn short_ttl(&self) -> Duration {
        self.short_ttl
    }

    /// Start the periodic sweep. The task holds only a weak reference and
    /// exits once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> PeriodicTask {
        let cache: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::spawn("cache_sweep", every, every, move || {
            let cache = cache.clone();
            async move {
                if let Some(cache) = cache.upgrade() {
                    let removed = cache.sweep_expired();
                    if removed > 0 {
                        debug!(removed, remaining = cache.len(), "Swept expired cache entries");
                    }
                }
            }
        })
    }
}

impl<V: Clone + Send + Sync + 'static> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, SHORT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_cache() -> ExpiringCache<String> {
        ExpiringCache::new(Duration::from_secs(60), Duration::from_millis(20))
    }

    #[test]
    fn test_put_and_get() {
        let cache = short_cache();
        cache.put("player_p1", "alpha".to_string());
        assert_eq!(cache.get("player_p1"), Some("alpha".to_string()));
        assert!(cache.contains("player_p1"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_get_missing() {
        let cache = short_cache();
        assert_eq!(cache.get("player_nope"), None);
        assert!(!cache.contains("player_nope"));
    }

    #[test]
    fn test_put_overwrites() {
        let cache = short_cache();
        cache.put("k", "v1".to_string());
        cache.put("k", "v2".to_string());
        assert_eq!(cache.get("k"), Some("v2".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_lazy_expiry_removes_entry() {
        let cache = short_cache();
        cache.put_short_lived("player_p1", "fresh".to_string());
        assert_eq!(cache.len(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("player_p1"), None);
        assert_eq!(cache.len(), 0, "expired entry must be removed on read");
    }

    #[tokio::test]
    async fn test_contains_respects_expiry() {
        let cache = short_cache();
        cache.put_with_ttl("k", "v".to_string(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!cache.contains("k"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = short_cache();
        cache.put("a", "1".to_string());
        cache.put("b", "2".to_string());

        assert_eq!(cache.remove("a"), Some("1".to_string()));
        assert_eq!(cache.remove("a"), None);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_owner_is_exact() {
        let cache = short_cache();
        cache.put("player_p1", "r".to_string());
        cache.put("exists_p1", "e".to_string());
        cache.put("player_p10", "other".to_string());
        cache.put("exists_p2", "other".to_string());
        cache.put("p1", "bare key has no owner".to_string());

        assert_eq!(cache.invalidate_owner("p1"), 2);
        assert!(!cache.contains("player_p1"));
        assert!(!cache.contains("exists_p1"));
        assert!(cache.contains("player_p10"));
        assert!(cache.contains("exists_p2"));
        assert!(cache.contains("p1"));
    }

    #[tokio::test]
    async fn test_set_ttl_extends_entry() {
        let cache = short_cache();
        cache.put_short_lived("k", "v".to_string());
        assert!(cache.set_ttl("k", Duration::from_secs(60)));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_set_ttl_shortens_entry() {
        let cache = short_cache();
        cache.put("k", "v".to_string());
        assert!(cache.set_ttl("k", Duration::from_millis(10)));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_set_ttl_absent_is_noop() {
        let cache = short_cache();
        assert!(!cache.set_ttl("missing", Duration::from_secs(1)));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_purges_only_expired() {
        let cache = short_cache();
        cache.put_short_lived("short", "s".to_string());
        cache.put("long", "l".to_string());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.stats(), CacheStats { live: 1, expired: 1 });

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("long"));
    }

    #[tokio::test]
    async fn test_sweeper_runs_in_background() {
        let cache = Arc::new(short_cache());
        cache.put_short_lived("k", "v".to_string());

        let sweeper = cache.spawn_sweeper(Duration::from_millis(25));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cache.len(), 0, "sweeper should purge without any read");
        sweeper.cancel();
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache: Arc<ExpiringCache<usize>> = Arc::new(ExpiringCache::default());
        let mut handles = Vec::new();

        for t in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..200 {
                    let key = format!("player_{}", i % 50);
                    cache.put(key.clone(), t);
                    let _ = cache.get(&key);
                    if i % 7 == 0 {
                        cache.invalidate_owner(&format!("{}", i % 50));
                    }
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(cache.len() <= 50);
    }
}
