//! Cache configuration.
//!
//! Controls entry lifetime, the capacity bound and the background sweep cadence. Built
//! from [`crate::config::CacheSettings`], the `[cache]` settings section.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_TTL_SECS: u64 = 10 * 60;
const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 5 * 60;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime applied by `set` when no explicit TTL is given.
    pub default_ttl: Duration,
    /// Maximum number of entries before least-recently-used eviction.
    pub capacity: usize,
    /// Interval between background expiry sweeps.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            capacity: DEFAULT_CAPACITY,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            default_ttl: settings.ttl,
            capacity: settings.capacity.get(),
            cleanup_interval: settings.cleanup_interval,
        }
    }
}

impl CacheConfig {
    /// Returns the capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
