use sqlx::{Postgres, QueryBuilder, Transaction};

use crate::application::repos::RepoError;
use crate::domain::orders::{Delivery, Item, Order, Payment};
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;

impl PostgresRepositories {
    /// Upsert the order and all dependent rows in one transaction. Items are replaced
    /// wholesale so a redelivered order never accumulates duplicates.
    pub(super) async fn upsert_order(&self, order: &Order) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        upsert_order_row(&mut tx, order).await?;
        upsert_delivery(&mut tx, &order.order_uid, &order.delivery).await?;
        upsert_payment(&mut tx, &order.order_uid, &order.payment).await?;
        replace_items(&mut tx, &order.order_uid, &order.items).await?;

        tx.commit().await.map_err(map_sqlx_error)
    }
}

async fn upsert_order_row(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        INSERT INTO orders (
            order_uid, track_number, entry, locale, internal_signature,
            customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (order_uid) DO UPDATE SET
            track_number = EXCLUDED.track_number,
            entry = EXCLUDED.entry,
            locale = EXCLUDED.locale,
            internal_signature = EXCLUDED.internal_signature,
            customer_id = EXCLUDED.customer_id,
            delivery_service = EXCLUDED.delivery_service,
            shardkey = EXCLUDED.shardkey,
            sm_id = EXCLUDED.sm_id,
            date_created = EXCLUDED.date_created,
            oof_shard = EXCLUDED.oof_shard
        "#,
    )
    .bind(&order.order_uid)
    .bind(&order.track_number)
    .bind(&order.entry)
    .bind(&order.locale)
    .bind(&order.internal_signature)
    .bind(&order.customer_id)
    .bind(&order.delivery_service)
    .bind(&order.shardkey)
    .bind(order.sm_id)
    .bind(order.date_created)
    .bind(&order.oof_shard)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

async fn upsert_delivery(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    delivery: &Delivery,
) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (order_uid) DO UPDATE SET
            name = EXCLUDED.name,
            phone = EXCLUDED.phone,
            zip = EXCLUDED.zip,
            city = EXCLUDED.city,
            address = EXCLUDED.address,
            region = EXCLUDED.region,
            email = EXCLUDED.email
        "#,
    )
    .bind(order_uid)
    .bind(&delivery.name)
    .bind(&delivery.phone)
    .bind(&delivery.zip)
    .bind(&delivery.city)
    .bind(&delivery.address)
    .bind(&delivery.region)
    .bind(&delivery.email)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

async fn upsert_payment(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    payment: &Payment,
) -> Result<(), RepoError> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            order_uid, transaction, request_id, currency, provider, amount,
            payment_dt, bank, delivery_cost, goods_total, custom_fee
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (order_uid) DO UPDATE SET
            transaction = EXCLUDED.transaction,
            request_id = EXCLUDED.request_id,
            currency = EXCLUDED.currency,
            provider = EXCLUDED.provider,
            amount = EXCLUDED.amount,
            payment_dt = EXCLUDED.payment_dt,
            bank = EXCLUDED.bank,
            delivery_cost = EXCLUDED.delivery_cost,
            goods_total = EXCLUDED.goods_total,
            custom_fee = EXCLUDED.custom_fee
        "#,
    )
    .bind(order_uid)
    .bind(&payment.transaction)
    .bind(&payment.request_id)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(payment.amount)
    .bind(payment.payment_dt)
    .bind(&payment.bank)
    .bind(payment.delivery_cost)
    .bind(payment.goods_total)
    .bind(payment.custom_fee)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

async fn replace_items(
    tx: &mut Transaction<'_, Postgres>,
    order_uid: &str,
    items: &[Item],
) -> Result<(), RepoError> {
    sqlx::query("DELETE FROM items WHERE order_uid = $1")
        .bind(order_uid)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

    if items.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Postgres>::new(
        "INSERT INTO items (order_uid, chrt_id, track_number, price, rid, name, sale, size, \
         total_price, nm_id, brand, status) ",
    );
    qb.push_values(items, |mut row, item| {
        row.push_bind(order_uid)
            .push_bind(item.chrt_id)
            .push_bind(&item.track_number)
            .push_bind(item.price)
            .push_bind(&item.rid)
            .push_bind(&item.name)
            .push_bind(item.sale)
            .push_bind(&item.size)
            .push_bind(item.total_price)
            .push_bind(item.nm_id)
            .push_bind(&item.brand)
            .push_bind(item.status);
    });
    qb.build()
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}
