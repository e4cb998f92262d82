use thiserror::Error;

use crate::domain::orders::Order;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed order payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encoded order ready for a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

/// Message as delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub key: Option<String>,
    pub offset: u64,
    pub payload: Vec<u8>,
}

pub fn encode_order(order: &Order) -> Result<OutboundMessage, CodecError> {
    Ok(OutboundMessage {
        key: order.order_uid.clone(),
        payload: serde_json::to_vec(order)?,
    })
}

pub fn decode_order(payload: &[u8]) -> Result<Order, CodecError> {
    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::orders::fixtures::sample_order;

    #[test]
    fn message_key_is_the_order_uid() {
        let message = encode_order(&sample_order("b563feb7b2b84b6test")).expect("encodes");
        assert_eq!(message.key, "b563feb7b2b84b6test");
    }

    #[test]
    fn decodes_wire_format_with_optional_fields_missing() {
        let payload = json!({
            "order_uid": "b563feb7b2b84b6test",
            "track_number": "WBILMTESTTRACK",
            "entry": "WBIL",
            "delivery": {
                "name": "Test Testov",
                "phone": "+9720000000",
                "zip": "2639809",
                "city": "Kiryat Mozkin",
                "address": "Ploshad Mira 15",
                "region": "Kraiot",
                "email": "test@gmail.com"
            },
            "payment": {
                "transaction": "b563feb7b2b84b6test",
                "currency": "USD",
                "provider": "wbpay",
                "amount": 1817,
                "payment_dt": 1637907727,
                "bank": "alpha",
                "delivery_cost": 1500,
                "goods_total": 317,
                "custom_fee": 0
            },
            "items": [{
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }],
            "locale": "en",
            "customer_id": "test",
            "delivery_service": "meest",
            "sm_id": 99,
            "date_created": "2021-11-26T06:22:19Z"
        });

        let order = decode_order(payload.to_string().as_bytes()).expect("decodes");
        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.payment.request_id, "");
        assert_eq!(order.shardkey, "");
        assert_eq!(order.items[0].nm_id, 2389212);
        assert_eq!(order.date_created.year(), 2021);
    }

    #[test]
    fn garbage_payload_is_a_codec_error() {
        let err = decode_order(b"{not json").expect_err("rejects garbage");
        assert!(err.to_string().starts_with("malformed order payload"));
    }
}
