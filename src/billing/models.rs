use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// key: billing-subscription-status -> provider lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    IncompleteExpired,
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Paused,
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "past_due" => SubscriptionStatus::PastDue,
            "canceled" => SubscriptionStatus::Canceled,
            "unpaid" => SubscriptionStatus::Unpaid,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Unknown,
        }
    }

    /// Statuses in which the subscription still charges its own default payment method.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing | SubscriptionStatus::PastDue
        )
    }
}

/// key: billing-snapshot -> last known subscription state cached on the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub subscription_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<String>,
    pub refreshed_at: DateTime<Utc>,
}

impl SubscriptionSnapshot {
    pub fn from_subscription(subscription: &Subscription, now: DateTime<Utc>) -> Self {
        Self {
            subscription_id: Some(subscription.id.clone()),
            status: Some(subscription.status),
            plan: subscription.plan_id().map(str::to_string),
            refreshed_at: now,
        }
    }

    /// Subscription id, but only while the cached status is live.
    pub fn live_subscription_id(&self) -> Option<&str> {
        match (self.subscription_id.as_deref(), self.status) {
            (Some(id), Some(status)) if status.is_live() => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceSettings {
    #[serde(default)]
    pub default_payment_method: Option<String>,
}

/// key: billing-customer -> provider customer fields read here
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub invoice_settings: InvoiceSettings,
}

impl Customer {
    pub fn default_payment_method(&self) -> Option<&str> {
        self.invoice_settings.default_payment_method.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub id: String,
    #[serde(default)]
    pub lookup_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// key: billing-subscription -> provider subscription fields read here
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: SubscriptionStatus,
    pub customer: String,
    #[serde(default)]
    pub default_payment_method: Option<String>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl Subscription {
    /// Plan reference of the first item, preferring the price lookup key.
    pub fn plan_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .map(|item| item.price.lookup_key.as_deref().unwrap_or(&item.price.id))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
}

/// key: billing-payment-method -> card details surfaced for display only
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub card: Option<Card>,
}

/// Provider object ids (`pm_...`, `cus_...`, `sub_...`) are plain word characters.
pub fn is_provider_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 255
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Deserialize)]
pub struct ListEnvelope<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

/// Card as presented to the account owner, with the reconciled default flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodView {
    pub id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u32>,
    pub exp_year: Option<u32>,
    pub is_default: bool,
}

impl PaymentMethodView {
    pub fn new(method: PaymentMethod, default_id: Option<&str>) -> Self {
        let is_default = default_id == Some(method.id.as_str());
        let card = method.card;
        Self {
            id: method.id,
            brand: card.as_ref().map(|card| card.brand.clone()),
            last4: card.as_ref().map(|card| card.last4.clone()),
            exp_month: card.as_ref().map(|card| card.exp_month),
            exp_year: card.as_ref().map(|card| card.exp_year),
            is_default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachOutcome {
    pub customer_id: String,
    pub customer_created: bool,
    pub is_default: bool,
}
