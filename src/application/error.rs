use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{application::orders::OrderServiceError, infra::error::InfraError};

const ORDER_ERROR_SOURCE: &str = "infra::http::order_error_to_http_error";

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Store failures on the read path are reported as a plain miss to callers; the
/// attached report keeps the underlying cause for logging.
impl From<OrderServiceError> for HttpError {
    fn from(error: OrderServiceError) -> Self {
        match &error {
            OrderServiceError::InvalidArgument(_) => HttpError::from_error(
                ORDER_ERROR_SOURCE,
                StatusCode::BAD_REQUEST,
                "Order ID is required",
                &error,
            ),
            OrderServiceError::NotFound(_) | OrderServiceError::Store { .. } => {
                HttpError::from_error(
                    ORDER_ERROR_SOURCE,
                    StatusCode::NOT_FOUND,
                    "Order not found",
                    &error,
                )
            }
            OrderServiceError::ValidationFailed(_) => HttpError::from_error(
                ORDER_ERROR_SOURCE,
                StatusCode::UNPROCESSABLE_ENTITY,
                "Order is invalid",
                &error,
            ),
            OrderServiceError::CacheWriteFailed { .. }
            | OrderServiceError::PersistenceFailed { .. }
            | OrderServiceError::RestoreFailed(_) => HttpError::from_error(
                ORDER_ERROR_SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Orders(#[from] OrderServiceError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Orders(OrderServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Orders(OrderServiceError::InvalidArgument(_))
            | AppError::Orders(OrderServiceError::ValidationFailed(_)) => StatusCode::BAD_REQUEST,
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(_) | AppError::Orders(_) | AppError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Orders(OrderServiceError::NotFound(_)) => "Resource not found",
            AppError::Orders(OrderServiceError::InvalidArgument(_))
            | AppError::Orders(OrderServiceError::ValidationFailed(_)) => {
                "Request could not be processed"
            }
            AppError::Infra(InfraError::Database { .. }) => "Service temporarily unavailable",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Infra(InfraError::Bind { .. }) => "Listener could not be bound",
            AppError::Orders(_) | AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}
