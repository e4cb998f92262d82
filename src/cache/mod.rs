//! Order cache.
//!
//! An expiring, size-bounded, in-memory view of recently ingested or read orders.
//! The durable store remains the system of record; everything here is expendable and
//! can be rebuilt with the startup restore sweep.
//!
//! ## Configuration
//!
//! [`CacheConfig`] is built from the `[cache]` section of the application settings:
//!
//! ```toml
//! [cache]
//! ttl_seconds = 600
//! capacity = 1000
//! cleanup_interval_seconds = 300
//! ```

mod config;
mod store;

pub use config::CacheConfig;
pub use store::{
    CacheError, CacheStats, METRIC_CACHE_EVICT, METRIC_CACHE_EXPIRED, METRIC_CACHE_HIT,
    MAX_ENTRY_TTL, METRIC_CACHE_MISS, OrderCache, OrderCacheStore,
};
