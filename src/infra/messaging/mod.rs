//! Inbound and outbound order messaging.
//!
//! Orders travel as JSON payloads keyed by `order_uid`. The transport here is an in-process
//! bounded channel; anything that implements [`MessageSource`] or [`OrderPublisher`] can stand
//! in for a broker client.

mod channel;
mod codec;
mod consumer;
mod generator;

pub use channel::{ChannelPublisher, ChannelSource, channel};
pub use codec::{CodecError, InboundMessage, OutboundMessage, decode_order, encode_order};
pub use consumer::{ConsumerStats, OrderConsumer};
pub use generator::{OrderGenerator, synthetic_order};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::orders::Order;

pub const ORDERS_TOPIC: &str = "orders";
pub const METRIC_INGEST_PROCESSED: &str = "orderflow_ingest_processed_total";
pub const METRIC_INGEST_REJECTED: &str = "orderflow_ingest_rejected_total";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Encode(#[from] CodecError),
    #[error("topic `{topic}` is closed")]
    Closed { topic: &'static str },
}

#[async_trait]
pub trait OrderPublisher: Send + Sync {
    async fn publish(&self, order: &Order) -> Result<(), PublishError>;
}

#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message. `None` means the source is exhausted.
    async fn next_message(&mut self) -> Option<InboundMessage>;

    /// Take a message that is already buffered locally without waiting.
    ///
    /// Used to drain on shutdown. Sources backed by a broker that redelivers
    /// uncommitted offsets can keep the default.
    fn try_next_message(&mut self) -> Option<InboundMessage> {
        None
    }
}
