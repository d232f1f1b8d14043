use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::adapters::BillingGateway;
use super::error::{BillingError, PaymentMethodError};
use super::models::{AttachOutcome, PaymentMethodView, SubscriptionSnapshot};
use crate::users::{User, UserStore};

/// key: billing-service -> default payment method reconciliation
///
/// The provider keeps two notions of "default card": the customer's invoice default and the
/// subscription's own default. While a subscription is live (active, trialing, past due) its
/// default is the one that gets charged, so it wins; otherwise the customer default does.
#[derive(Clone)]
pub struct PaymentMethodService {
    gateway: Arc<dyn BillingGateway>,
    users: Arc<dyn UserStore>,
}

impl PaymentMethodService {
    pub fn new(gateway: Arc<dyn BillingGateway>, users: Arc<dyn UserStore>) -> Self {
        Self { gateway, users }
    }

    async fn load_user(&self, user_id: i32) -> Result<User, PaymentMethodError> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or(PaymentMethodError::UserNotFound)
    }

    pub async fn list(&self, user_id: i32) -> Result<Vec<PaymentMethodView>, PaymentMethodError> {
        let user = self.load_user(user_id).await?;
        let Some(customer_id) = user.billing_customer_id.as_deref() else {
            return Ok(Vec::new());
        };

        let methods = self.gateway.list_card_payment_methods(customer_id).await?;

        let live_subscription = user
            .subscription
            .as_ref()
            .and_then(SubscriptionSnapshot::live_subscription_id);
        let default_id = match live_subscription {
            Some(subscription_id) => {
                self.gateway
                    .retrieve_subscription(subscription_id)
                    .await?
                    .default_payment_method
            }
            None => self
                .gateway
                .retrieve_customer(customer_id)
                .await?
                .invoice_settings
                .default_payment_method,
        };

        Ok(methods
            .into_iter()
            .map(|method| PaymentMethodView::new(method, default_id.as_deref()))
            .collect())
    }

    pub async fn attach(
        &self,
        user_id: i32,
        payment_method_id: &str,
    ) -> Result<AttachOutcome, PaymentMethodError> {
        let user = self.load_user(user_id).await?;

        let Some(customer_id) = user.billing_customer_id else {
            let customer = self
                .gateway
                .create_customer(user.name.as_deref(), &user.email, payment_method_id)
                .await?;
            self.users.set_billing_customer(user.id, &customer.id).await?;
            info!(user_id, customer = %customer.id, "created billing customer");
            return Ok(AttachOutcome {
                customer_id: customer.id,
                customer_created: true,
                is_default: true,
            });
        };

        self.gateway
            .attach_payment_method(payment_method_id, &customer_id)
            .await?;

        let customer = self.gateway.retrieve_customer(&customer_id).await?;
        let is_default = match customer.default_payment_method() {
            Some(existing) => existing == payment_method_id,
            None => {
                self.gateway
                    .set_customer_default(&customer_id, payment_method_id)
                    .await?;
                true
            }
        };

        Ok(AttachOutcome {
            customer_id,
            customer_created: false,
            is_default,
        })
    }

    pub async fn set_default(
        &self,
        user_id: i32,
        payment_method_id: &str,
    ) -> Result<(), PaymentMethodError> {
        let user = self.load_user(user_id).await?;
        let Some(customer_id) = user.billing_customer_id.as_deref() else {
            return Err(PaymentMethodError::MissingCustomer);
        };

        self.gateway
            .set_customer_default(customer_id, payment_method_id)
            .await?;

        if let Some(subscription_id) = user
            .subscription
            .as_ref()
            .and_then(SubscriptionSnapshot::live_subscription_id)
        {
            if let Err(err) = self
                .gateway
                .set_subscription_default(subscription_id, payment_method_id)
                .await
            {
                warn!(
                    ?err,
                    user_id,
                    subscription = subscription_id,
                    "failed to update subscription default payment method"
                );
            }
        }

        Ok(())
    }

    pub async fn delete(
        &self,
        user_id: i32,
        payment_method_id: &str,
    ) -> Result<(), PaymentMethodError> {
        let user = self.load_user(user_id).await?;
        let Some(customer_id) = user.billing_customer_id.as_deref() else {
            return Err(PaymentMethodError::MissingCustomer);
        };

        let method = match self.gateway.retrieve_payment_method(payment_method_id).await {
            Ok(method) => method,
            Err(BillingError::Api { status: 404, .. }) => {
                return Err(PaymentMethodError::PaymentMethodNotFound)
            }
            Err(err) => return Err(err.into()),
        };
        if method.customer.as_deref() != Some(customer_id) {
            warn!(
                user_id,
                payment_method = payment_method_id,
                "refusing to detach a payment method of another customer"
            );
            return Err(PaymentMethodError::PaymentMethodNotFound);
        }

        let subscription_id = user
            .subscription
            .as_ref()
            .and_then(|snapshot| snapshot.subscription_id.as_deref());
        if let Some(subscription_id) = subscription_id {
            let subscription = self.gateway.retrieve_subscription(subscription_id).await?;

            let mut refreshed = SubscriptionSnapshot::from_subscription(&subscription, Utc::now());
            if refreshed.plan.is_none() {
                refreshed.plan = user.subscription.as_ref().and_then(|s| s.plan.clone());
            }
            if let Err(err) = self.users.save_subscription_snapshot(user.id, &refreshed).await {
                warn!(?err, user_id, "failed to refresh cached subscription snapshot");
            }

            if subscription.status.is_live()
                && subscription.default_payment_method.as_deref() == Some(payment_method_id)
            {
                return Err(PaymentMethodError::ActiveSubscriptionDefault);
            }
        }

        self.gateway.detach_payment_method(payment_method_id).await?;
        Ok(())
    }
}
