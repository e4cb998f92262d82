//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::orders::Order;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Durable order storage. The store is the system of record; nothing is ever deleted
/// through this contract.
#[async_trait]
pub trait OrdersRepo: Send + Sync {
    /// Load an order together with its delivery, payment and items.
    async fn find_by_uid(&self, order_uid: &str) -> Result<Option<Order>, RepoError>;

    /// Insert or overwrite an order and all of its parts atomically.
    async fn save_order(&self, order: &Order) -> Result<(), RepoError>;

    /// Every stored identifier, newest `date_created` first.
    async fn list_order_uids(&self) -> Result<Vec<String>, RepoError>;

    /// Release underlying connections. Further calls fail.
    async fn close(&self);
}
