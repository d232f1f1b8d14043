use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::billing::{ReconciliationHandle, ReconciliationJob, Subscription};
use crate::error::{AppError, AppResult};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies a `t=<unix>,v1=<hex>` header against an HMAC-SHA256 of `"<t>.<body>"`.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Expired);
    }

    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    let matched = signatures.into_iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// key: webhooks-billing -> provider event entrypoint
#[derive(Debug, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix seconds at which the provider created the event.
    pub created: i64,
    pub data: BillingEventData,
}

#[derive(Debug, Deserialize)]
pub struct BillingEventData {
    pub object: Value,
}

pub async fn billing_webhook(
    Extension(reconciliation): Extension<ReconciliationHandle>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<StatusCode> {
    let secret = crate::config::BILLING_WEBHOOK_SECRET
        .as_deref()
        .ok_or_else(|| AppError::Message("billing webhook secret not configured".into()))?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::BadRequest("Missing signature".into()))?;
    verify_signature(
        secret,
        signature,
        &body,
        Utc::now().timestamp(),
        *crate::config::BILLING_WEBHOOK_TOLERANCE_SECS,
    )
    .map_err(|err| {
        tracing::warn!(%err, "rejected billing webhook");
        AppError::Unauthorized
    })?;

    let event: BillingEvent = serde_json::from_slice(&body)
        .map_err(|err| AppError::BadRequest(format!("invalid event payload: {err}")))?;

    let occurred_at = Utc
        .timestamp_opt(event.created, 0)
        .single()
        .ok_or_else(|| AppError::BadRequest("invalid event timestamp".into()))?;
    let job = match event.event_type.as_str() {
        "customer.subscription.created" | "customer.subscription.updated" => {
            ReconciliationJob::SubscriptionChanged {
                subscription: parse_subscription(event.data.object)?,
                occurred_at,
            }
        }
        "customer.subscription.deleted" => ReconciliationJob::SubscriptionDeleted {
            subscription: parse_subscription(event.data.object)?,
            occurred_at,
        },
        other => {
            tracing::debug!(event = %event.id, kind = other, "ignoring billing event");
            return Ok(StatusCode::OK);
        }
    };

    reconciliation.dispatch(job).await.map_err(|err| {
        tracing::error!(?err, event = %event.id, "failed to enqueue billing event");
        AppError::Message("failed to enqueue billing event".into())
    })?;
    Ok(StatusCode::ACCEPTED)
}

fn parse_subscription(object: Value) -> AppResult<Subscription> {
    serde_json::from_value(object)
        .map_err(|err| AppError::BadRequest(format!("invalid subscription object: {err}")))
}
