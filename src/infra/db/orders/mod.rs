mod read;
mod types;
mod write;

use async_trait::async_trait;
use tracing::info;

use crate::application::repos::{OrdersRepo, RepoError};
use crate::domain::orders::Order;

use super::PostgresRepositories;

#[async_trait]
impl OrdersRepo for PostgresRepositories {
    async fn find_by_uid(&self, order_uid: &str) -> Result<Option<Order>, RepoError> {
        self.fetch_order(order_uid).await
    }

    async fn save_order(&self, order: &Order) -> Result<(), RepoError> {
        self.upsert_order(order).await
    }

    async fn list_order_uids(&self) -> Result<Vec<String>, RepoError> {
        self.fetch_order_uids().await
    }

    async fn close(&self) {
        self.pool().close().await;
        info!(target = "orderflow::db", "database pool closed");
    }
}
