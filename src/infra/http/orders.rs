use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::application::error::HttpError;
use crate::cache::CacheStats;
use crate::domain::orders::Order;

use super::{HttpState, db_health_response};

#[derive(Debug, Serialize)]
pub(super) struct OrdersSnapshot {
    pub(super) order_uids: Vec<String>,
    pub(super) orders: Vec<Order>,
}

pub(super) async fn order_detail(
    State(state): State<HttpState>,
    Path(order_uid): Path<String>,
) -> Response {
    match state.orders.get_order(order_uid.trim()).await {
        Ok(order) => Json(order).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

/// Cached orders only; the list is not authoritative.
pub(super) async fn cached_orders(State(state): State<HttpState>) -> Json<OrdersSnapshot> {
    let orders = state.orders.get_all_orders();
    let order_uids = orders.iter().map(|order| order.order_uid.clone()).collect();
    Json(OrdersSnapshot { order_uids, orders })
}

pub(super) async fn cache_stats(State(state): State<HttpState>) -> Json<CacheStats> {
    Json(state.orders.cache_stats())
}

pub(super) async fn health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}
