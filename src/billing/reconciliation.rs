use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{channel, Sender};
use tracing::{error, info, warn};

use super::models::{Subscription, SubscriptionSnapshot, SubscriptionStatus};
use crate::users::UserStore;

/// key: billing-reconciliation -> background worker for provider callbacks
#[derive(Debug, Clone)]
pub enum ReconciliationJob {
    SubscriptionChanged {
        subscription: Subscription,
        occurred_at: DateTime<Utc>,
    },
    SubscriptionDeleted {
        subscription: Subscription,
        occurred_at: DateTime<Utc>,
    },
}

impl ReconciliationJob {
    fn customer_id(&self) -> &str {
        match self {
            ReconciliationJob::SubscriptionChanged { subscription, .. }
            | ReconciliationJob::SubscriptionDeleted { subscription, .. } => {
                &subscription.customer
            }
        }
    }

    fn snapshot(&self) -> SubscriptionSnapshot {
        match self {
            ReconciliationJob::SubscriptionChanged {
                subscription,
                occurred_at,
            } => SubscriptionSnapshot::from_subscription(subscription, *occurred_at),
            ReconciliationJob::SubscriptionDeleted {
                subscription,
                occurred_at,
            } => SubscriptionSnapshot {
                status: Some(SubscriptionStatus::Canceled),
                ..SubscriptionSnapshot::from_subscription(subscription, *occurred_at)
            },
        }
    }
}

/// key: billing-reconciliation-handle -> enqueue interface
#[derive(Clone)]
pub struct ReconciliationHandle {
    sender: Sender<ReconciliationJob>,
}

impl ReconciliationHandle {
    pub async fn dispatch(&self, job: ReconciliationJob) -> Result<()> {
        self.sender
            .send(job)
            .await
            .map_err(|err| anyhow!("failed to enqueue billing reconciliation job: {err}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationOutcome {
    Applied,
    /// The stored snapshot was refreshed after this event occurred.
    Stale,
    UnknownCustomer,
}

/// Writes the snapshot carried by `job` onto the user owning its billing customer.
/// Events are applied by the time they occurred at the provider, so a late
/// delivery never overwrites newer state.
pub async fn apply_job(
    users: &dyn UserStore,
    job: &ReconciliationJob,
) -> Result<ReconciliationOutcome> {
    let customer_id = job.customer_id();
    let Some(user) = users.find_by_billing_customer(customer_id).await? else {
        return Ok(ReconciliationOutcome::UnknownCustomer);
    };
    let snapshot = job.snapshot();
    if !users.save_subscription_snapshot(user.id, &snapshot).await? {
        info!(
            user_id = user.id,
            customer = customer_id,
            occurred_at = %snapshot.refreshed_at,
            "skipping out-of-order subscription event"
        );
        return Ok(ReconciliationOutcome::Stale);
    }
    info!(
        user_id = user.id,
        customer = customer_id,
        status = ?snapshot.status,
        "subscription snapshot refreshed"
    );
    Ok(ReconciliationOutcome::Applied)
}

pub fn start_reconciliation_worker(users: Arc<dyn UserStore>) -> ReconciliationHandle {
    let (tx, mut rx) = channel(64);
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match apply_job(users.as_ref(), &job).await {
                Ok(ReconciliationOutcome::Applied | ReconciliationOutcome::Stale) => {}
                Ok(ReconciliationOutcome::UnknownCustomer) => warn!(
                    customer = job.customer_id(),
                    "subscription event for unknown billing customer"
                ),
                Err(err) => error!(
                    ?err,
                    customer = job.customer_id(),
                    "failed to reconcile subscription update from provider",
                ),
            }
        }
    });

    ReconciliationHandle { sender: tx }
}
