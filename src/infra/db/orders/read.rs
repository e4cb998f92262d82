use crate::application::repos::RepoError;
use crate::domain::orders::Order;
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;
use super::types::{DeliveryRow, ItemRow, OrderRow, PaymentRow};

impl PostgresRepositories {
    pub(super) async fn fetch_order(&self, order_uid: &str) -> Result<Option<Order>, RepoError> {
        let Some(order) = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT order_uid, track_number, entry, locale, internal_signature,
                   customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            FROM orders
            WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        else {
            return Ok(None);
        };

        let delivery = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT name, phone, zip, city, address, region, email
            FROM deliveries
            WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_one(self.pool())
        .await
        .map_err(|err| incomplete(order_uid, "delivery", err))?;

        let payment = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT transaction, request_id, currency, provider, amount, payment_dt,
                   bank, delivery_cost, goods_total, custom_fee
            FROM payments
            WHERE order_uid = $1
            "#,
        )
        .bind(order_uid)
        .fetch_one(self.pool())
        .await
        .map_err(|err| incomplete(order_uid, "payment", err))?;

        let items = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items
            WHERE order_uid = $1
            ORDER BY id
            "#,
        )
        .bind(order_uid)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Some(order.assemble(
            delivery.into(),
            payment.into(),
            items.into_iter().map(Into::into).collect(),
        )))
    }

    pub(super) async fn fetch_order_uids(&self) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT order_uid
            FROM orders
            ORDER BY date_created DESC
            "#,
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}

/// A stored order must always have its delivery and payment rows.
fn incomplete(order_uid: &str, part: &str, err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::Integrity {
            message: format!("order `{order_uid}` has no {part} row"),
        },
        other => map_sqlx_error(other),
    }
}
