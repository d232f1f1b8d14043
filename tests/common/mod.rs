#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use signdesk::billing::{
    BillingError, BillingGateway, Card, Customer, InvoiceSettings, PaymentMethod, Subscription,
    SubscriptionSnapshot, SubscriptionStatus,
};
use signdesk::users::{User, UserStore};

pub const JWT_SECRET: &str = "integration-secret";

#[derive(Default)]
struct GatewayState {
    customers: HashMap<String, Option<String>>,
    subscriptions: HashMap<String, (String, SubscriptionStatus, Option<String>)>,
    attached: HashMap<String, String>,
    calls: Vec<String>,
    next_customer: u32,
    fail_subscription_update: bool,
}

/// In-memory stand-in for the card-payments provider.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(self, customer_id: &str, default_pm: Option<&str>, cards: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .customers
                .insert(customer_id.to_string(), default_pm.map(str::to_string));
            for card in cards {
                state
                    .attached
                    .insert(card.to_string(), customer_id.to_string());
            }
        }
        self
    }

    pub fn with_subscription(
        self,
        subscription_id: &str,
        customer_id: &str,
        status: SubscriptionStatus,
        default_pm: Option<&str>,
    ) -> Self {
        self.state.lock().unwrap().subscriptions.insert(
            subscription_id.to_string(),
            (customer_id.to_string(), status, default_pm.map(str::to_string)),
        );
        self
    }

    pub fn failing_subscription_updates(self) -> Self {
        self.state.lock().unwrap().fail_subscription_update = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn customer_default(&self, customer_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .customers
            .get(customer_id)
            .cloned()
            .flatten()
    }

    pub fn subscription_default(&self, subscription_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .get(subscription_id)
            .and_then(|(_, _, default)| default.clone())
    }

    pub fn cards_of(&self, customer_id: &str) -> Vec<String> {
        let mut cards: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .attached
            .iter()
            .filter(|(_, owner)| owner.as_str() == customer_id)
            .map(|(card, _)| card.clone())
            .collect();
        cards.sort();
        cards
    }
}

fn missing(kind: &str, id: &str) -> BillingError {
    BillingError::Api {
        status: 404,
        code: Some("resource_missing".into()),
        message: format!("No such {kind}: '{id}'"),
    }
}

fn card(id: &str, customer: &str) -> PaymentMethod {
    PaymentMethod {
        id: id.to_string(),
        customer: Some(customer.to_string()),
        card: Some(Card {
            brand: "visa".into(),
            last4: "4242".into(),
            exp_month: 12,
            exp_year: 2030,
        }),
    }
}

fn customer(id: &str, default_pm: Option<String>) -> Customer {
    Customer {
        id: id.to_string(),
        email: None,
        invoice_settings: InvoiceSettings {
            default_payment_method: default_pm,
        },
    }
}

fn subscription(
    id: &str,
    (customer, status, default_pm): &(String, SubscriptionStatus, Option<String>),
) -> Subscription {
    Subscription {
        id: id.to_string(),
        status: *status,
        customer: customer.clone(),
        default_payment_method: default_pm.clone(),
        items: Default::default(),
    }
}

#[async_trait]
impl BillingGateway for FakeGateway {
    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethod>, BillingError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("list:{customer_id}"));
        Ok(self
            .cards_of(customer_id)
            .iter()
            .map(|id| card(id, customer_id))
            .collect())
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, BillingError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("retrieve_customer:{customer_id}"));
        let default = state
            .customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| missing("customer", customer_id))?;
        Ok(customer(customer_id, default))
    }

    async fn create_customer(
        &self,
        _name: Option<&str>,
        _email: &str,
        payment_method_id: &str,
    ) -> Result<Customer, BillingError> {
        let mut state = self.state.lock().unwrap();
        state.next_customer += 1;
        let id = format!("cus_new_{}", state.next_customer);
        state.calls.push(format!("create_customer:{payment_method_id}"));
        state
            .customers
            .insert(id.clone(), Some(payment_method_id.to_string()));
        state
            .attached
            .insert(payment_method_id.to_string(), id.clone());
        Ok(customer(&id, Some(payment_method_id.to_string())))
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("attach:{payment_method_id}:{customer_id}"));
        if !state.customers.contains_key(customer_id) {
            return Err(missing("customer", customer_id));
        }
        state
            .attached
            .insert(payment_method_id.to_string(), customer_id.to_string());
        Ok(card(payment_method_id, customer_id))
    }

    async fn set_customer_default(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<Customer, BillingError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("set_customer_default:{customer_id}:{payment_method_id}"));
        let slot = state
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| missing("customer", customer_id))?;
        *slot = Some(payment_method_id.to_string());
        Ok(customer(customer_id, Some(payment_method_id.to_string())))
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, BillingError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("retrieve_subscription:{subscription_id}"));
        let record = state
            .subscriptions
            .get(subscription_id)
            .ok_or_else(|| missing("subscription", subscription_id))?;
        Ok(subscription(subscription_id, record))
    }

    async fn set_subscription_default(
        &self,
        subscription_id: &str,
        payment_method_id: &str,
    ) -> Result<Subscription, BillingError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!(
            "set_subscription_default:{subscription_id}:{payment_method_id}"
        ));
        if state.fail_subscription_update {
            return Err(BillingError::Api {
                status: 500,
                code: None,
                message: "upstream unavailable".into(),
            });
        }
        let record = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| missing("subscription", subscription_id))?;
        record.2 = Some(payment_method_id.to_string());
        let record = record.clone();
        Ok(subscription(subscription_id, &record))
    }

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("retrieve_payment_method:{payment_method_id}"));
        let customer = state
            .attached
            .get(payment_method_id)
            .cloned()
            .ok_or_else(|| missing("payment_method", payment_method_id))?;
        Ok(card(payment_method_id, &customer))
    }

    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("detach:{payment_method_id}"));
        let customer = state
            .attached
            .remove(payment_method_id)
            .ok_or_else(|| missing("payment_method", payment_method_id))?;
        Ok(card(payment_method_id, &customer))
    }
}

/// User records kept in memory.
#[derive(Default)]
pub struct InMemoryUsers {
    users: Mutex<HashMap<i32, User>>,
}

impl InMemoryUsers {
    pub fn with_user(self, user: User) -> Self {
        self.users.lock().unwrap().insert(user.id, user);
        self
    }

    pub fn get(&self, user_id: i32) -> Option<User> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }
}

#[async_trait]
impl UserStore for InMemoryUsers {
    async fn find_user(&self, user_id: i32) -> Result<Option<User>, sqlx::Error> {
        Ok(self.get(user_id))
    }

    async fn find_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|user| user.billing_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn set_billing_customer(
        &self,
        user_id: i32,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        if let Some(user) = self.users.lock().unwrap().get_mut(&user_id) {
            user.billing_customer_id = Some(customer_id.to_string());
        }
        Ok(())
    }

    async fn save_subscription_snapshot(
        &self,
        user_id: i32,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<bool, sqlx::Error> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.get_mut(&user_id) else {
            return Ok(false);
        };
        if let Some(current) = &user.subscription {
            if current.refreshed_at > snapshot.refreshed_at {
                return Ok(false);
            }
        }
        user.subscription = Some(snapshot.clone());
        Ok(true)
    }
}

pub fn user(id: i32, customer_id: Option<&str>) -> User {
    User {
        id,
        email: format!("user{id}@example.com"),
        name: Some(format!("User {id}")),
        billing_customer_id: customer_id.map(str::to_string),
        subscription: None,
    }
}

pub fn snapshot(subscription_id: &str, status: SubscriptionStatus) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        subscription_id: Some(subscription_id.to_string()),
        status: Some(status),
        plan: Some("pro_monthly".into()),
        refreshed_at: Utc::now(),
    }
}

pub fn bearer(user_id: i32) -> String {
    let claims = serde_json::json!({"sub": user_id, "exp": 9999999999u64});
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {token}")
}
