use std::sync::Arc;

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    InboundMessage, METRIC_INGEST_PROCESSED, METRIC_INGEST_REJECTED, MessageSource, ORDERS_TOPIC,
    decode_order,
};
use crate::application::orders::{OrderService, OrderServiceError};

/// Counters for one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub processed: u64,
    pub rejected: u64,
}

/// Feeds inbound messages to [`OrderService::process_order`] one at a time.
///
/// A failing message is logged and skipped; it never stops the loop.
pub struct OrderConsumer<S> {
    source: S,
    service: Arc<OrderService>,
    shutdown: CancellationToken,
}

impl<S: MessageSource> OrderConsumer<S> {
    pub fn new(source: S, service: Arc<OrderService>, shutdown: CancellationToken) -> Self {
        Self {
            source,
            service,
            shutdown,
        }
    }

    /// Consume until the shutdown token fires or the source is exhausted.
    pub async fn run(self) -> ConsumerStats {
        let Self {
            mut source,
            service,
            shutdown,
        } = self;
        let mut stats = ConsumerStats::default();

        info!(
            target = "orderflow::ingest",
            topic = ORDERS_TOPIC,
            "order consumer started"
        );

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => {
                    drain_buffered(&mut source, &service, &mut stats).await;
                    break;
                }
                message = source.next_message() => match message {
                    Some(message) => message,
                    None => {
                        info!(target = "orderflow::ingest", "message source closed");
                        break;
                    }
                },
            };

            record(&mut stats, handle_message(&service, message).await);
        }

        info!(
            target = "orderflow::ingest",
            received = stats.received,
            processed = stats.processed,
            rejected = stats.rejected,
            "order consumer stopped"
        );
        stats
    }
}

fn record(stats: &mut ConsumerStats, processed: bool) {
    stats.received += 1;
    if processed {
        stats.processed += 1;
    } else {
        stats.rejected += 1;
    }
}

/// Process whatever the source already holds so it is not lost when the loop stops.
async fn drain_buffered<S: MessageSource>(
    source: &mut S,
    service: &OrderService,
    stats: &mut ConsumerStats,
) {
    let mut drained = 0u64;
    while let Some(message) = source.try_next_message() {
        record(stats, handle_message(service, message).await);
        drained += 1;
    }
    if drained > 0 {
        info!(
            target = "orderflow::ingest",
            drained, "processed buffered messages before shutdown"
        );
    }
}

async fn handle_message(service: &OrderService, message: InboundMessage) -> bool {
    debug!(
        target = "orderflow::ingest",
        offset = message.offset,
        key = message.key.as_deref().unwrap_or(""),
        "message received"
    );

    let order = match decode_order(&message.payload) {
        Ok(order) => order,
        Err(err) => {
            warn!(
                target = "orderflow::ingest",
                offset = message.offset,
                error = %err,
                "dropping undecodable message"
            );
            counter!(METRIC_INGEST_REJECTED, "reason" => "decode").increment(1);
            return false;
        }
    };

    let order_uid = order.order_uid.clone();
    match service.process_order(order).await {
        Ok(()) => {
            counter!(METRIC_INGEST_PROCESSED).increment(1);
            true
        }
        Err(err) => {
            let reason = rejection_reason(&err);
            if matches!(err, OrderServiceError::ValidationFailed(_)) {
                warn!(
                    target = "orderflow::ingest",
                    order_uid = %order_uid,
                    offset = message.offset,
                    error = %err,
                    "order rejected"
                );
            } else {
                error!(
                    target = "orderflow::ingest",
                    order_uid = %order_uid,
                    offset = message.offset,
                    error = %err,
                    "failed to process order"
                );
            }
            counter!(METRIC_INGEST_REJECTED, "reason" => reason).increment(1);
            false
        }
    }
}

fn rejection_reason(err: &OrderServiceError) -> &'static str {
    match err {
        OrderServiceError::ValidationFailed(_) => "validation",
        OrderServiceError::CacheWriteFailed { .. } => "cache",
        OrderServiceError::PersistenceFailed { .. } => "persistence",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::application::repos::{OrdersRepo, RepoError};
    use crate::cache::{CacheConfig, OrderCache, OrderCacheStore};
    use crate::domain::orders::{Order, fixtures::sample_order};
    use crate::infra::messaging::{OrderPublisher, encode_order};

    struct ScriptedSource {
        messages: VecDeque<InboundMessage>,
    }

    impl ScriptedSource {
        fn new(payloads: Vec<Vec<u8>>) -> Self {
            let messages = payloads
                .into_iter()
                .enumerate()
                .map(|(offset, payload)| InboundMessage {
                    key: None,
                    offset: offset as u64,
                    payload,
                })
                .collect();
            Self { messages }
        }
    }

    #[async_trait]
    impl MessageSource for ScriptedSource {
        async fn next_message(&mut self) -> Option<InboundMessage> {
            self.messages.pop_front()
        }
    }

    #[derive(Default)]
    struct RecordingOrdersRepo {
        saved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OrdersRepo for RecordingOrdersRepo {
        async fn find_by_uid(&self, _order_uid: &str) -> Result<Option<Order>, RepoError> {
            Ok(None)
        }

        async fn save_order(&self, order: &Order) -> Result<(), RepoError> {
            self.saved.lock().unwrap().push(order.order_uid.clone());
            Ok(())
        }

        async fn list_order_uids(&self) -> Result<Vec<String>, RepoError> {
            Ok(self.saved.lock().unwrap().clone())
        }

        async fn close(&self) {}
    }

    fn payload(order: &Order) -> Vec<u8> {
        encode_order(order).expect("encodes").payload
    }

    #[tokio::test]
    async fn bad_messages_are_skipped_and_good_ones_processed() {
        let repo = Arc::new(RecordingOrdersRepo::default());
        let cache = Arc::new(OrderCacheStore::new(&CacheConfig::default()));
        let service = Arc::new(OrderService::new(repo.clone(), cache.clone()));

        let mut invalid = sample_order("invalid");
        invalid.delivery.email = "nope".to_string();
        let source = ScriptedSource::new(vec![
            payload(&sample_order("A")),
            b"garbage".to_vec(),
            payload(&invalid),
            payload(&sample_order("B")),
        ]);

        let stats = OrderConsumer::new(source, service, CancellationToken::new())
            .run()
            .await;

        assert_eq!(
            stats,
            ConsumerStats {
                received: 4,
                processed: 2,
                rejected: 2,
            }
        );
        assert_eq!(*repo.saved.lock().unwrap(), vec!["A", "B"]);
        assert_eq!(cache.size(), 2);
    }

    #[tokio::test]
    async fn cancellation_stops_a_waiting_consumer() {
        let repo = Arc::new(RecordingOrdersRepo::default());
        let cache = Arc::new(OrderCacheStore::new(&CacheConfig::default()));
        let service = Arc::new(OrderService::new(repo, cache));
        let (publisher, source) =
            crate::infra::messaging::channel(std::num::NonZeroUsize::MIN);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(OrderConsumer::new(source, service, shutdown.clone()).run());
        shutdown.cancel();

        let stats = handle.await.expect("consumer joins");
        assert_eq!(stats.received, 0);
        drop(publisher);
    }

    #[tokio::test]
    async fn buffered_messages_are_processed_on_shutdown() {
        let repo = Arc::new(RecordingOrdersRepo::default());
        let cache = Arc::new(OrderCacheStore::new(&CacheConfig::default()));
        let service = Arc::new(OrderService::new(repo.clone(), cache.clone()));
        let (publisher, source) =
            crate::infra::messaging::channel(std::num::NonZeroUsize::new(4).unwrap());
        for uid in ["A", "B", "C"] {
            publisher
                .publish(&sample_order(uid))
                .await
                .expect("publish succeeds");
        }

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let stats = OrderConsumer::new(source, service, shutdown).run().await;

        assert_eq!(stats.processed, 3);
        assert_eq!(*repo.saved.lock().unwrap(), vec!["A", "B", "C"]);
        assert_eq!(cache.size(), 3);
        drop(publisher);
    }
}
