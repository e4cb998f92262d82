use time::OffsetDateTime;

use crate::domain::orders::{Delivery, Item, Order, Payment};

#[derive(sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub(crate) order_uid: String,
    pub(crate) track_number: String,
    pub(crate) entry: String,
    pub(crate) locale: String,
    pub(crate) internal_signature: String,
    pub(crate) customer_id: String,
    pub(crate) delivery_service: String,
    pub(crate) shardkey: String,
    pub(crate) sm_id: i32,
    pub(crate) date_created: OffsetDateTime,
    pub(crate) oof_shard: String,
}

impl OrderRow {
    pub(crate) fn assemble(self, delivery: Delivery, payment: Payment, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery,
            payment,
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct DeliveryRow {
    pub(crate) name: String,
    pub(crate) phone: String,
    pub(crate) zip: String,
    pub(crate) city: String,
    pub(crate) address: String,
    pub(crate) region: String,
    pub(crate) email: String,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Self {
            name: row.name,
            phone: row.phone,
            zip: row.zip,
            city: row.city,
            address: row.address,
            region: row.region,
            email: row.email,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PaymentRow {
    pub(crate) transaction: String,
    pub(crate) request_id: String,
    pub(crate) currency: String,
    pub(crate) provider: String,
    pub(crate) amount: i64,
    pub(crate) payment_dt: i64,
    pub(crate) bank: String,
    pub(crate) delivery_cost: i64,
    pub(crate) goods_total: i64,
    pub(crate) custom_fee: i64,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Self {
            transaction: row.transaction,
            request_id: row.request_id,
            currency: row.currency,
            provider: row.provider,
            amount: row.amount,
            payment_dt: row.payment_dt,
            bank: row.bank,
            delivery_cost: row.delivery_cost,
            goods_total: row.goods_total,
            custom_fee: row.custom_fee,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub(crate) chrt_id: i64,
    pub(crate) track_number: String,
    pub(crate) price: i64,
    pub(crate) rid: String,
    pub(crate) name: String,
    pub(crate) sale: i32,
    pub(crate) size: String,
    pub(crate) total_price: i64,
    pub(crate) nm_id: i64,
    pub(crate) brand: String,
    pub(crate) status: i32,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            chrt_id: row.chrt_id,
            track_number: row.track_number,
            price: row.price,
            rid: row.rid,
            name: row.name,
            sale: row.sale,
            size: row.size,
            total_price: row.total_price,
            nm_id: row.nm_id,
            brand: row.brand,
            status: row.status,
        }
    }
}
