//! HTTP read surface over the order service.

mod middleware;
mod orders;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::application::orders::OrderService;
use crate::infra::db::PostgresRepositories;

use middleware::{log_responses, set_request_context};

/// Liveness probe for the backing store.
#[async_trait]
pub trait DatabaseHealth: Send + Sync {
    async fn health_check(&self) -> Result<(), SqlxError>;
}

#[async_trait]
impl DatabaseHealth for PostgresRepositories {
    async fn health_check(&self) -> Result<(), SqlxError> {
        PostgresRepositories::health_check(self).await
    }
}

#[derive(Clone)]
pub struct HttpState {
    pub orders: Arc<OrderService>,
    pub db: Arc<dyn DatabaseHealth>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/api/orders", get(orders::cached_orders))
        .route("/api/orders/{order_uid}", get(orders::order_detail))
        .route("/api/cache/stats", get(orders::cache_stats))
        .route("/health", get(orders::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
