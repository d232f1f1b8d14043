use axum::{http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;

use crate::billing::{BillingError, PaymentMethodError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Refused(String),
    #[error("{0}")]
    Message(String),
}

impl From<PaymentMethodError> for AppError {
    fn from(err: PaymentMethodError) -> Self {
        match err {
            PaymentMethodError::UserNotFound
            | PaymentMethodError::MissingCustomer
            | PaymentMethodError::PaymentMethodNotFound => AppError::NotFound,
            PaymentMethodError::ActiveSubscriptionDefault => AppError::Refused(err.to_string()),
            PaymentMethodError::Billing(err) => AppError::Billing(err),
            PaymentMethodError::Store(err) => AppError::Db(err),
        }
    }
}

fn billing_status(err: &BillingError) -> StatusCode {
    match err {
        // 401/403 concern our own API key, not the caller
        BillingError::Api { status, .. }
            if (400..500).contains(status) && !matches!(*status, 401 | 403) =>
        {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST)
        }
        BillingError::InvalidId(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::Refused(_) => StatusCode::CONFLICT,
            AppError::Billing(err) => billing_status(err),
            AppError::Db(_) | AppError::Message(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(?self);
        (status, self.to_string()).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
