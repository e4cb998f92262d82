use std::num::NonZeroUsize;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    InboundMessage, MessageSource, ORDERS_TOPIC, OrderPublisher, OutboundMessage, PublishError,
    encode_order,
};
use crate::domain::orders::Order;

/// Bounded in-process topic. Publishers wait when the buffer is full.
pub fn channel(capacity: NonZeroUsize) -> (ChannelPublisher, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.get());
    (
        ChannelPublisher { tx },
        ChannelSource {
            rx,
            next_offset: 0,
        },
    )
}

#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::Sender<OutboundMessage>,
}

impl ChannelPublisher {
    /// Send an already encoded message. Used for replaying raw payloads.
    pub async fn send(&self, message: OutboundMessage) -> Result<(), PublishError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| PublishError::Closed {
                topic: ORDERS_TOPIC,
            })
    }
}

#[async_trait]
impl OrderPublisher for ChannelPublisher {
    async fn publish(&self, order: &Order) -> Result<(), PublishError> {
        let message = encode_order(order)?;
        self.send(message).await
    }
}

pub struct ChannelSource {
    rx: mpsc::Receiver<OutboundMessage>,
    next_offset: u64,
}

impl ChannelSource {
    fn assign_offset(&mut self, message: OutboundMessage) -> InboundMessage {
        let offset = self.next_offset;
        self.next_offset += 1;
        InboundMessage {
            key: Some(message.key),
            offset,
            payload: message.payload,
        }
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Option<InboundMessage> {
        let message = self.rx.recv().await?;
        Some(self.assign_offset(message))
    }

    fn try_next_message(&mut self) -> Option<InboundMessage> {
        let message = self.rx.try_recv().ok()?;
        Some(self.assign_offset(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orders::fixtures::sample_order;
    use crate::infra::messaging::decode_order;

    #[tokio::test]
    async fn published_orders_arrive_in_order_with_offsets() {
        let (publisher, mut source) = channel(NonZeroUsize::new(4).unwrap());

        publisher.publish(&sample_order("A")).await.expect("publish A");
        publisher.publish(&sample_order("B")).await.expect("publish B");
        drop(publisher);

        let first = source.next_message().await.expect("first message");
        let second = source.next_message().await.expect("second message");
        assert_eq!(first.key.as_deref(), Some("A"));
        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 1);
        assert_eq!(decode_order(&second.payload).unwrap().order_uid, "B");
        assert!(source.next_message().await.is_none());
    }

    #[tokio::test]
    async fn buffered_messages_can_be_taken_without_waiting() {
        let (publisher, mut source) = channel(NonZeroUsize::new(4).unwrap());
        assert!(source.try_next_message().is_none());

        publisher.publish(&sample_order("A")).await.expect("publish A");
        let message = source.try_next_message().expect("buffered message");
        assert_eq!(message.key.as_deref(), Some("A"));
        assert_eq!(message.offset, 0);
        assert!(source.try_next_message().is_none());
    }

    #[tokio::test]
    async fn publishing_to_a_dropped_source_fails() {
        let (publisher, source) = channel(NonZeroUsize::MIN);
        drop(source);

        let err = publisher
            .publish(&sample_order("A"))
            .await
            .expect_err("receiver gone");
        assert!(matches!(err, PublishError::Closed { topic: "orders" }));
    }
}
