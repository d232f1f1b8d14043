use thiserror::Error;

/// key: billing-errors -> provider failures surfaced verbatim
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("billing provider error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("billing provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("billing provider returned an unexpected payload: {0}")]
    Decode(String),
    #[error("billing provider is not configured")]
    NotConfigured,
    #[error("invalid billing object id `{0}`")]
    InvalidId(String),
}

#[derive(Debug, Error)]
pub enum PaymentMethodError {
    #[error("user not found")]
    UserNotFound,
    #[error("no billing customer on file")]
    MissingCustomer,
    #[error("payment method not found")]
    PaymentMethodNotFound,
    #[error(
        "cannot delete the default payment method of an active subscription; set a new default first"
    )]
    ActiveSubscriptionDefault,
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error("user store error: {0}")]
    Store(#[from] sqlx::Error),
}
