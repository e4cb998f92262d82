//! Periodic expiry sweep over the order cache.

use std::{sync::Arc, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::orders::OrderService;

pub struct CacheSweepJob {
    service: Arc<OrderService>,
    period: Duration,
    shutdown: CancellationToken,
}

impl CacheSweepJob {
    pub fn new(service: Arc<OrderService>, period: Duration, shutdown: CancellationToken) -> Self {
        Self {
            service,
            period,
            shutdown,
        }
    }

    /// Sweep expired entries every `period` until the shutdown token fires.
    pub async fn run(self) {
        info!(
            target = "orderflow::jobs::cache_sweep",
            period_secs = self.period.as_secs(),
            "cache sweep started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!(target = "orderflow::jobs::cache_sweep", "cache sweep stopped");
    }

    fn sweep_once(&self) -> usize {
        let removed = self.service.cleanup_cache();
        let stats = self.service.cache_stats();
        if removed > 0 {
            info!(
                target = "orderflow::jobs::cache_sweep",
                removed,
                total_entries = stats.total_entries,
                max_size = stats.max_size,
                "expired orders removed from cache"
            );
        } else {
            debug!(
                target = "orderflow::jobs::cache_sweep",
                total_entries = stats.total_entries,
                "cache sweep found nothing to remove"
            );
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::{OrdersRepo, RepoError};
    use crate::cache::{CacheConfig, OrderCache, OrderCacheStore};
    use crate::domain::orders::{Order, fixtures::sample_order};

    struct EmptyRepo;

    #[async_trait]
    impl OrdersRepo for EmptyRepo {
        async fn find_by_uid(&self, _order_uid: &str) -> Result<Option<Order>, RepoError> {
            Ok(None)
        }

        async fn save_order(&self, _order: &Order) -> Result<(), RepoError> {
            Ok(())
        }

        async fn list_order_uids(&self) -> Result<Vec<String>, RepoError> {
            Ok(Vec::new())
        }

        async fn close(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_expired_entries_on_each_tick() {
        let cache = Arc::new(OrderCacheStore::new(&CacheConfig::default()));
        cache
            .set_with_ttl(sample_order("short"), Duration::from_secs(5))
            .expect("set succeeds");
        cache.set(sample_order("long")).expect("set succeeds");

        let service = Arc::new(OrderService::new(Arc::new(EmptyRepo), cache.clone()));
        let shutdown = CancellationToken::new();
        let job = CacheSweepJob::new(service, Duration::from_secs(10), shutdown.clone());
        let handle = tokio::spawn(job.run());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(cache.size(), 1);
        assert!(cache.get("long").is_some());

        shutdown.cancel();
        handle.await.expect("sweep task joins");
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_loop() {
        let cache = Arc::new(OrderCacheStore::new(&CacheConfig::default()));
        let service = Arc::new(OrderService::new(Arc::new(EmptyRepo), cache));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        CacheSweepJob::new(service, Duration::from_secs(60), shutdown)
            .run()
            .await;
    }
}
