//! Order ingestion and lookup.
//!
//! [`OrderService`] sequences validation, the cache write and durable persistence for inbound
//! orders, serves reads cache-first and rebuilds the cache from the store at startup.
//!
//! Writes go to the cache before the store. A store failure is reported to the caller but the
//! cached copy is kept, so an order can be readable before it is durable.

use std::{sync::Arc, time::Instant};

use metrics::histogram;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::repos::{OrdersRepo, RepoError};
use crate::cache::{CacheError, CacheStats, OrderCache};
use crate::domain::orders::Order;
use crate::domain::validation::{OrderValidator, StandardOrderValidator, ValidationError};

pub const METRIC_CACHE_RESTORE_MS: &str = "orderflow_cache_restore_ms";

#[derive(Debug, Error)]
pub enum OrderServiceError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("order validation failed: {0}")]
    ValidationFailed(#[source] ValidationError),
    #[error("failed to cache order `{order_uid}`: {source}")]
    CacheWriteFailed {
        order_uid: String,
        #[source]
        source: CacheError,
    },
    #[error("failed to save order `{order_uid}` to the store: {source}")]
    PersistenceFailed {
        order_uid: String,
        #[source]
        source: RepoError,
    },
    #[error("order `{0}` not found")]
    NotFound(String),
    #[error("failed to load order `{order_uid}` from the store: {source}")]
    Store {
        order_uid: String,
        #[source]
        source: RepoError,
    },
    #[error("failed to list order ids for cache restoration: {0}")]
    RestoreFailed(#[source] RepoError),
}

/// Outcome of a cache restore sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub listed: usize,
    pub restored: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct OrderService {
    repo: Arc<dyn OrdersRepo>,
    cache: Arc<dyn OrderCache>,
    validator: Arc<dyn OrderValidator>,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrdersRepo>, cache: Arc<dyn OrderCache>) -> Self {
        Self {
            repo,
            cache,
            validator: Arc::new(StandardOrderValidator),
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn OrderValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub async fn process_order(&self, order: Order) -> Result<(), OrderServiceError> {
        self.validator
            .validate(&order)
            .map_err(OrderServiceError::ValidationFailed)?;

        self.cache
            .set(order.clone())
            .map_err(|source| OrderServiceError::CacheWriteFailed {
                order_uid: order.order_uid.clone(),
                source,
            })?;
        debug!(
            target = "orderflow::orders",
            order_uid = %order.order_uid,
            "order cached"
        );

        self.repo.save_order(&order).await.map_err(|source| {
            OrderServiceError::PersistenceFailed {
                order_uid: order.order_uid.clone(),
                source,
            }
        })?;

        info!(
            target = "orderflow::orders",
            order_uid = %order.order_uid,
            items = order.items.len(),
            "order processed"
        );
        Ok(())
    }

    pub async fn get_order(&self, order_uid: &str) -> Result<Order, OrderServiceError> {
        if order_uid.is_empty() {
            return Err(OrderServiceError::InvalidArgument("order_uid cannot be empty"));
        }

        if let Some(order) = self.cache.get(order_uid) {
            return Ok(order);
        }

        let order = self
            .repo
            .find_by_uid(order_uid)
            .await
            .map_err(|source| OrderServiceError::Store {
                order_uid: order_uid.to_string(),
                source,
            })?
            .ok_or_else(|| OrderServiceError::NotFound(order_uid.to_string()))?;

        if let Err(err) = self.cache.set(order.clone()) {
            warn!(
                target = "orderflow::orders",
                order_uid = %order_uid,
                error = %err,
                "failed to repopulate cache after store read"
            );
        }

        Ok(order)
    }

    /// Orders currently held in the cache. Never consults the store, so the listing can be
    /// incomplete.
    pub fn get_all_orders(&self) -> Vec<Order> {
        self.cache.get_all()
    }

    /// Reload every stored order into the cache.
    ///
    /// Only a failure to list identifiers is fatal. Individual orders that fail to load or
    /// cache are logged and skipped. Rerunning simply overwrites cached entries.
    pub async fn restore_cache_from_store(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RestoreSummary, OrderServiceError> {
        let started_at = Instant::now();
        info!(target = "orderflow::restore", "restoring cache from store");

        let order_uids = self
            .repo
            .list_order_uids()
            .await
            .map_err(OrderServiceError::RestoreFailed)?;

        let mut summary = RestoreSummary {
            listed: order_uids.len(),
            ..RestoreSummary::default()
        };

        for order_uid in order_uids {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let order = match self.repo.find_by_uid(&order_uid).await {
                Ok(Some(order)) => order,
                Ok(None) => {
                    warn!(
                        target = "orderflow::restore",
                        order_uid = %order_uid,
                        "listed order vanished before it could be restored"
                    );
                    summary.skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(
                        target = "orderflow::restore",
                        order_uid = %order_uid,
                        error = %err,
                        "failed to load order for cache restore"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            if let Err(err) = self.cache.set(order) {
                warn!(
                    target = "orderflow::restore",
                    order_uid = %order_uid,
                    error = %err,
                    "failed to cache restored order"
                );
                summary.skipped += 1;
                continue;
            }
            summary.restored += 1;
        }

        histogram!(METRIC_CACHE_RESTORE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            target = "orderflow::restore",
            listed = summary.listed,
            restored = summary.restored,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "cache restore finished"
        );
        Ok(summary)
    }

    pub fn cleanup_cache(&self) -> usize {
        self.cache.cleanup()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::{CacheConfig, OrderCacheStore};
    use crate::domain::orders::fixtures::sample_order;

    #[derive(Default)]
    struct StubOrdersRepo {
        orders: Mutex<HashMap<String, Order>>,
        listing: Mutex<Vec<String>>,
        broken: HashSet<String>,
        fail_saves: bool,
        fail_listing: bool,
        reads: AtomicUsize,
        saves: AtomicUsize,
    }

    impl StubOrdersRepo {
        fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
            let repo = Self::default();
            for order in orders {
                repo.listing.lock().unwrap().push(order.order_uid.clone());
                repo.orders
                    .lock()
                    .unwrap()
                    .insert(order.order_uid.clone(), order);
            }
            repo
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrdersRepo for StubOrdersRepo {
        async fn find_by_uid(&self, order_uid: &str) -> Result<Option<Order>, RepoError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.broken.contains(order_uid) {
                return Err(RepoError::from_persistence("corrupt row"));
            }
            Ok(self.orders.lock().unwrap().get(order_uid).cloned())
        }

        async fn save_order(&self, order: &Order) -> Result<(), RepoError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.fail_saves {
                return Err(RepoError::Timeout);
            }
            self.orders
                .lock()
                .unwrap()
                .insert(order.order_uid.clone(), order.clone());
            Ok(())
        }

        async fn list_order_uids(&self) -> Result<Vec<String>, RepoError> {
            if self.fail_listing {
                return Err(RepoError::from_persistence("connection refused"));
            }
            Ok(self.listing.lock().unwrap().clone())
        }

        async fn close(&self) {}
    }

    struct AcceptAll;

    impl OrderValidator for AcceptAll {
        fn validate(&self, _order: &Order) -> Result<(), ValidationError> {
            Ok(())
        }
    }

    fn cache() -> Arc<OrderCacheStore> {
        Arc::new(OrderCacheStore::new(&CacheConfig::default()))
    }

    fn service(repo: Arc<StubOrdersRepo>, cache: Arc<OrderCacheStore>) -> OrderService {
        OrderService::new(repo, cache)
    }

    #[tokio::test]
    async fn processed_order_is_served_from_cache() {
        let repo = Arc::new(StubOrdersRepo::default());
        let service = service(repo.clone(), cache());
        let order = sample_order("A");

        service
            .process_order(order.clone())
            .await
            .expect("order processed");

        let fetched = service.get_order("A").await.expect("order found");
        assert_eq!(fetched, order);
        assert_eq!(repo.saves.load(Ordering::SeqCst), 1);
        assert_eq!(repo.reads(), 0);
    }

    #[tokio::test]
    async fn invalid_order_touches_neither_cache_nor_store() {
        let repo = Arc::new(StubOrdersRepo::default());
        let cache = cache();
        let service = service(repo.clone(), cache.clone());
        let mut order = sample_order("A");
        order.payment.currency = "EURO".to_string();

        let err = service
            .process_order(order)
            .await
            .expect_err("validation fails");

        match err {
            OrderServiceError::ValidationFailed(violation) => {
                assert_eq!(violation.field, "currency")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cache.size(), 0);
        assert_eq!(repo.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cache_rejection_stops_before_persistence() {
        let repo = Arc::new(StubOrdersRepo::default());
        let service = service(repo.clone(), cache()).with_validator(Arc::new(AcceptAll));

        let err = service
            .process_order(sample_order(""))
            .await
            .expect_err("cache rejects empty uid");

        assert!(matches!(
            err,
            OrderServiceError::CacheWriteFailed {
                source: CacheError::InvalidEntry,
                ..
            }
        ));
        assert_eq!(repo.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persistence_failure_is_surfaced_but_order_stays_cached() {
        let repo = Arc::new(StubOrdersRepo {
            fail_saves: true,
            ..Default::default()
        });
        let cache = cache();
        let service = service(repo.clone(), cache.clone());

        let err = service
            .process_order(sample_order("A"))
            .await
            .expect_err("store write fails");

        assert!(matches!(
            err,
            OrderServiceError::PersistenceFailed {
                source: RepoError::Timeout,
                ..
            }
        ));
        assert!(err.to_string().contains("`A`"));
        assert!(cache.get("A").is_some());
    }

    #[tokio::test]
    async fn redelivery_overwrites_the_cached_order() {
        let repo = Arc::new(StubOrdersRepo::default());
        let cache = cache();
        let service = service(repo.clone(), cache.clone());

        service
            .process_order(sample_order("A"))
            .await
            .expect("first delivery");
        let mut again = sample_order("A");
        again.track_number = "REDELIVERED".to_string();
        service.process_order(again).await.expect("redelivery");

        assert_eq!(cache.size(), 1);
        let fetched = service.get_order("A").await.expect("order found");
        assert_eq!(fetched.track_number, "REDELIVERED");
        assert_eq!(repo.orders.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_id_is_an_invalid_argument() {
        let service = service(Arc::new(StubOrdersRepo::default()), cache());
        assert!(matches!(
            service.get_order("").await,
            Err(OrderServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn cache_miss_reads_through_once() {
        let repo = Arc::new(StubOrdersRepo::with_orders([sample_order("A")]));
        let cache = cache();
        let service = service(repo.clone(), cache.clone());

        let first = service.get_order("A").await.expect("loaded from store");
        let second = service.get_order("A").await.expect("served from cache");

        assert_eq!(first, second);
        assert_eq!(repo.reads(), 1);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test]
    async fn missing_everywhere_is_not_found() {
        let service = service(Arc::new(StubOrdersRepo::default()), cache());
        assert!(matches!(
            service.get_order("ghost").await,
            Err(OrderServiceError::NotFound(uid)) if uid == "ghost"
        ));
    }

    #[tokio::test]
    async fn store_error_on_read_is_reported() {
        let repo = Arc::new(StubOrdersRepo {
            broken: HashSet::from(["A".to_string()]),
            ..Default::default()
        });
        let service = service(repo, cache());
        assert!(matches!(
            service.get_order("A").await,
            Err(OrderServiceError::Store { .. })
        ));
    }

    #[tokio::test]
    async fn get_all_orders_reflects_cache_only() {
        let repo = Arc::new(StubOrdersRepo::with_orders([sample_order("stored")]));
        let service = service(repo.clone(), cache());
        service
            .process_order(sample_order("cached"))
            .await
            .expect("order processed");

        let all = service.get_all_orders();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].order_uid, "cached");
        assert_eq!(repo.reads(), 0);
    }

    #[tokio::test]
    async fn restore_skips_broken_records() {
        let mut repo =
            StubOrdersRepo::with_orders(["A", "B", "C", "D"].into_iter().map(sample_order));
        repo.broken.insert("C".to_string());
        let cache = cache();
        let service = service(Arc::new(repo), cache.clone());

        let summary = service
            .restore_cache_from_store(&CancellationToken::new())
            .await
            .expect("restore succeeds");

        assert_eq!(
            summary,
            RestoreSummary {
                listed: 4,
                restored: 3,
                skipped: 1,
                cancelled: false,
            }
        );
        assert_eq!(cache.size(), 3);
        assert!(cache.get("C").is_none());
    }

    #[tokio::test]
    async fn restore_skips_listed_but_missing_orders() {
        let repo = StubOrdersRepo::with_orders([sample_order("A")]);
        repo.listing.lock().unwrap().push("gone".to_string());
        let service = service(Arc::new(repo), cache());

        let summary = service
            .restore_cache_from_store(&CancellationToken::new())
            .await
            .expect("restore succeeds");

        assert_eq!(summary.restored, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn restore_fails_when_listing_fails() {
        let repo = Arc::new(StubOrdersRepo {
            fail_listing: true,
            ..Default::default()
        });
        let service = service(repo, cache());

        let err = service
            .restore_cache_from_store(&CancellationToken::new())
            .await
            .expect_err("listing fails");
        assert!(matches!(err, OrderServiceError::RestoreFailed(_)));
    }

    #[tokio::test]
    async fn restore_is_idempotent() {
        let repo = Arc::new(StubOrdersRepo::with_orders(
            ["A", "B"].into_iter().map(sample_order),
        ));
        let cache = cache();
        let service = service(repo, cache.clone());
        let cancel = CancellationToken::new();

        service
            .restore_cache_from_store(&cancel)
            .await
            .expect("first restore");
        service
            .restore_cache_from_store(&cancel)
            .await
            .expect("second restore");

        assert_eq!(cache.size(), 2);
    }

    #[tokio::test]
    async fn cancelled_restore_stops_early() {
        let repo = Arc::new(StubOrdersRepo::with_orders(
            ["A", "B"].into_iter().map(sample_order),
        ));
        let cache = cache();
        let service = service(repo, cache.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = service
            .restore_cache_from_store(&cancel)
            .await
            .expect("restore returns partial summary");

        assert!(summary.cancelled);
        assert_eq!(summary.restored, 0);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn cleanup_and_stats_pass_through() {
        let cache = cache();
        cache
            .set_with_ttl(sample_order("stale"), std::time::Duration::ZERO)
            .expect("set succeeds");
        let service = service(Arc::new(StubOrdersRepo::default()), cache);

        assert_eq!(service.cache_stats().expired_entries, 1);
        assert_eq!(service.cleanup_cache(), 1);
        assert_eq!(service.cache_stats().total_entries, 0);
    }
}
