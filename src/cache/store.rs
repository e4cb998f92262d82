//! Expiring, size-bounded in-memory order cache.
//!
//! Every entry carries an expiry instant; recency is tracked by the LRU ordering so the
//! least recently read or written entry is the one evicted when the capacity bound is hit.
//! Expired entries are dropped lazily on lookup and in bulk by [`OrderCache::cleanup`].

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::orders::Order;

use super::config::CacheConfig;

const SOURCE: &str = "cache::store";

/// Longest lifetime an entry can be given; larger TTLs are clamped to it.
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

pub const METRIC_CACHE_HIT: &str = "orderflow_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "orderflow_cache_miss_total";
pub const METRIC_CACHE_EVICT: &str = "orderflow_cache_evict_total";
pub const METRIC_CACHE_EXPIRED: &str = "orderflow_cache_expired_total";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("invalid cache entry: order_uid is empty")]
    InvalidEntry,
    #[error("invalid cache key: order_uid is empty")]
    InvalidKey,
}

/// Point-in-time counters reported by [`OrderCache::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub max_size: usize,
}

/// Concurrent order cache keyed by `order_uid`.
///
/// All operations are safe to call from any number of tasks. None of them block on I/O.
pub trait OrderCache: Send + Sync {
    /// Store `order` with the configured default lifetime.
    fn set(&self, order: Order) -> Result<(), CacheError>;

    /// Store `order` with an explicit lifetime.
    fn set_with_ttl(&self, order: Order, ttl: Duration) -> Result<(), CacheError>;

    /// Look up a live entry, refreshing its recency. Expired entries are removed.
    fn get(&self, order_uid: &str) -> Option<Order>;

    /// Snapshot of every live entry. Does not refresh recency.
    fn get_all(&self) -> Vec<Order>;

    fn delete(&self, order_uid: &str) -> Result<(), CacheError>;

    /// Remove every expired entry, returning how many were dropped.
    fn cleanup(&self) -> usize;

    /// Entry count, including expired entries not yet swept.
    fn size(&self) -> usize;

    fn stats(&self) -> CacheStats;
}

struct CachedOrder {
    order: Order,
    expires_at: Instant,
}

impl CachedOrder {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// [`OrderCache`] backed by an [`LruCache`] behind a single reader/writer lock.
pub struct OrderCacheStore {
    entries: RwLock<LruCache<String, CachedOrder>>,
    default_ttl: Duration,
    max_size: usize,
}

impl OrderCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = config.capacity_non_zero();
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            default_ttl: config.default_ttl,
            max_size: capacity.get(),
        }
    }

    fn read(&self, op: &'static str) -> RwLockReadGuard<'_, LruCache<String, CachedOrder>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(
                op,
                target_module = SOURCE,
                lock_kind = "rwlock.read",
                "recovered from poisoned order cache lock"
            );
            poisoned.into_inner()
        })
    }

    fn write(&self, op: &'static str) -> RwLockWriteGuard<'_, LruCache<String, CachedOrder>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(
                op,
                target_module = SOURCE,
                lock_kind = "rwlock.write",
                "recovered from poisoned order cache lock"
            );
            poisoned.into_inner()
        })
    }
}

impl OrderCache for OrderCacheStore {
    fn set(&self, order: Order) -> Result<(), CacheError> {
        self.set_with_ttl(order, self.default_ttl)
    }

    fn set_with_ttl(&self, order: Order, ttl: Duration) -> Result<(), CacheError> {
        if order.order_uid.is_empty() {
            return Err(CacheError::InvalidEntry);
        }

        let key = order.order_uid.clone();
        let entry = CachedOrder {
            expires_at: Instant::now() + ttl.min(MAX_ENTRY_TTL),
            order,
        };

        // `push` hands back the displaced pair: the previous value for an overwrite, or the
        // least recently used entry when a new key arrives at capacity.
        let displaced = self.write("set").push(key.clone(), entry);
        if let Some((evicted, _)) = displaced
            && evicted != key
        {
            counter!(METRIC_CACHE_EVICT).increment(1);
            debug!(
                target = "orderflow::cache",
                order_uid = %evicted,
                "evicted least recently used order"
            );
        }
        Ok(())
    }

    fn get(&self, order_uid: &str) -> Option<Order> {
        if order_uid.is_empty() {
            return None;
        }

        let now = Instant::now();
        let mut entries = self.write("get");
        let expired = match entries.peek(order_uid) {
            None => {
                counter!(METRIC_CACHE_MISS).increment(1);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            entries.pop(order_uid);
            counter!(METRIC_CACHE_EXPIRED).increment(1);
            counter!(METRIC_CACHE_MISS).increment(1);
            return None;
        }

        counter!(METRIC_CACHE_HIT).increment(1);
        entries.get(order_uid).map(|entry| entry.order.clone())
    }

    fn get_all(&self) -> Vec<Order> {
        let now = Instant::now();
        self.read("get_all")
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(_, entry)| entry.order.clone())
            .collect()
    }

    fn delete(&self, order_uid: &str) -> Result<(), CacheError> {
        if order_uid.is_empty() {
            return Err(CacheError::InvalidKey);
        }
        self.write("delete").pop(order_uid);
        Ok(())
    }

    fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.write("cleanup");
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        if !expired.is_empty() {
            counter!(METRIC_CACHE_EXPIRED).increment(expired.len() as u64);
        }
        expired.len()
    }

    fn size(&self) -> usize {
        self.read("size").len()
    }

    fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.read("stats");
        let expired_entries = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .count();
        CacheStats {
            total_entries: entries.len(),
            expired_entries,
            max_size: self.max_size,
        }
    }
}
