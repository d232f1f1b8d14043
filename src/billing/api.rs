use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;

use super::{is_provider_id, AttachOutcome, PaymentMethodService, PaymentMethodView};
use crate::error::{AppError, AppResult};
use crate::extractor::AuthUser;
use crate::webhooks;

/// key: billing-api -> rest endpoints
pub fn routes() -> Router {
    Router::new()
        .route(
            "/api/payment-methods",
            get(list_payment_methods).post(attach_payment_method),
        )
        .route(
            "/api/payment-methods/:id/default",
            put(set_default_payment_method),
        )
        .route("/api/payment-methods/:id", delete(delete_payment_method))
        .route(
            "/api/billing/webhook",
            axum::routing::post(webhooks::billing_webhook),
        )
}

fn parse_payment_method_id(raw: &str) -> AppResult<&str> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(AppError::BadRequest("paymentMethodId required".into()));
    }
    if !is_provider_id(id) {
        return Err(AppError::BadRequest(format!("malformed payment method id `{id}`")));
    }
    Ok(id)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachPaymentMethodRequest {
    pub payment_method_id: String,
}

pub async fn list_payment_methods(
    AuthUser { user_id }: AuthUser,
    Extension(service): Extension<Arc<PaymentMethodService>>,
) -> AppResult<Json<Vec<PaymentMethodView>>> {
    let methods = service.list(user_id).await?;
    Ok(Json(methods))
}

pub async fn attach_payment_method(
    AuthUser { user_id }: AuthUser,
    Extension(service): Extension<Arc<PaymentMethodService>>,
    Json(payload): Json<AttachPaymentMethodRequest>,
) -> AppResult<(StatusCode, Json<AttachOutcome>)> {
    let payment_method_id = parse_payment_method_id(&payload.payment_method_id)?;
    let outcome = service.attach(user_id, payment_method_id).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn set_default_payment_method(
    AuthUser { user_id }: AuthUser,
    Extension(service): Extension<Arc<PaymentMethodService>>,
    Path(raw_id): Path<String>,
) -> AppResult<StatusCode> {
    service
        .set_default(user_id, parse_payment_method_id(&raw_id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_payment_method(
    AuthUser { user_id }: AuthUser,
    Extension(service): Extension<Arc<PaymentMethodService>>,
    Path(raw_id): Path<String>,
) -> AppResult<StatusCode> {
    service.delete(user_id, parse_payment_method_id(&raw_id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
