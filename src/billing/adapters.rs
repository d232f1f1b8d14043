use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use super::error::BillingError;
use super::models::{is_provider_id, Customer, ListEnvelope, PaymentMethod, Subscription};

/// key: billing-adapter -> provider integration
#[async_trait]
pub trait BillingGateway: Send + Sync {
    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethod>, BillingError>;

    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, BillingError>;

    /// Creates a customer with `payment_method_id` attached and set as its invoice default.
    async fn create_customer(
        &self,
        name: Option<&str>,
        email: &str,
        payment_method_id: &str,
    ) -> Result<Customer, BillingError>;

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<PaymentMethod, BillingError>;

    async fn set_customer_default(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<Customer, BillingError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, BillingError>;

    async fn set_subscription_default(
        &self,
        subscription_id: &str,
        payment_method_id: &str,
    ) -> Result<Subscription, BillingError>;

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError>;

async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError>;
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

const PAGE_LIMIT: &str = "100";

/// key: billing-adapter-stripe -> form-encoded REST client
pub struct StripeAdapter {
    base: Url,
    api_key: String,
    client: Client,
}

impl StripeAdapter {
    pub fn from_env() -> Result<Self, BillingError> {
        let api_key = crate::config::BILLING_API_KEY
            .clone()
            .ok_or(BillingError::NotConfigured)?;
        Self::new(crate::config::BILLING_API_BASE.as_str(), api_key)
    }

    pub fn new(base: &str, api_key: impl Into<String>) -> Result<Self, BillingError> {
        let base = Url::parse(&format!("{}/", base.trim_end_matches('/')))
            .map_err(|err| BillingError::Decode(format!("invalid billing base url: {err}")))?;
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            base,
            api_key: api_key.into(),
            client,
        })
    }

    /// Appends each segment percent-encoded; ids that are not plain word
    /// characters never reach the provider.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BillingError> {
        if let Some(bad) = segments.iter().find(|segment| !is_provider_id(segment)) {
            return Err(BillingError::InvalidId(bad.to_string()));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                BillingError::Decode(format!("billing base url {} has no path", self.base))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        form: Option<&[(&str, &str)]>,
    ) -> Result<T, BillingError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        let mut req = self
            .client
            .request(method.clone(), url)
            .bearer_auth(&self.api_key);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(form) = form {
            req = req.form(form);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => (
                    envelope.error.code,
                    envelope.error.message.unwrap_or_else(|| status.to_string()),
                ),
                Err(_) => (None, status.to_string()),
            };
            tracing::warn!(%method, %path, status = status.as_u16(), ?code, "billing provider rejected request");
            return Err(BillingError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }
        resp.json::<T>()
            .await
            .map_err(|err| BillingError::Decode(err.to_string()))
    }
}

#[async_trait]
impl BillingGateway for StripeAdapter {
    async fn list_card_payment_methods(
        &self,
        customer_id: &str,
    ) -> Result<Vec<PaymentMethod>, BillingError> {
        let mut methods = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![
                ("customer", customer_id),
                ("type", "card"),
                ("limit", PAGE_LIMIT),
            ];
            if let Some(after) = cursor.as_deref() {
                query.push(("starting_after", after));
            }
            let page: ListEnvelope<PaymentMethod> = self
                .request(Method::GET, &["v1", "payment_methods"], &query, None)
                .await?;
            let next = page.data.last().map(|method| method.id.clone());
            methods.extend(page.data);
            match next {
                Some(last) if page.has_more => cursor = Some(last),
                _ => break,
            }
        }
        Ok(methods)
    }

    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, BillingError> {
        self.request(
            Method::GET,
            &["v1", "customers", customer_id],
            &[],
            None,
        )
        .await
    }

    async fn create_customer(
        &self,
        name: Option<&str>,
        email: &str,
        payment_method_id: &str,
    ) -> Result<Customer, BillingError> {
        let mut form = vec![
            ("email", email),
            ("payment_method", payment_method_id),
            ("invoice_settings[default_payment_method]", payment_method_id),
        ];
        if let Some(name) = name {
            form.push(("name", name));
        }
        self.request(Method::POST, &["v1", "customers"], &[], Some(form.as_slice()))
            .await
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        self.request(
            Method::POST,
            &["v1", "payment_methods", payment_method_id, "attach"],
            &[],
            Some(&[("customer", customer_id)][..]),
        )
        .await
    }

    async fn set_customer_default(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<Customer, BillingError> {
        self.request(
            Method::POST,
            &["v1", "customers", customer_id],
            &[],
            Some(&[("invoice_settings[default_payment_method]", payment_method_id)][..]),
        )
        .await
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, BillingError> {
        self.request(
            Method::GET,
            &["v1", "subscriptions", subscription_id],
            &[],
            None,
        )
        .await
    }

    async fn set_subscription_default(
        &self,
        subscription_id: &str,
        payment_method_id: &str,
    ) -> Result<Subscription, BillingError> {
        self.request(
            Method::POST,
            &["v1", "subscriptions", subscription_id],
            &[],
            Some(&[("default_payment_method", payment_method_id)][..]),
        )
        .await
    }

    async fn retrieve_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        self.request(
            Method::GET,
            &["v1", "payment_methods", payment_method_id],
            &[],
            None,
        )
        .await
    }

    async fn detach_payment_method(
        &self,
        payment_method_id: &str,
    ) -> Result<PaymentMethod, BillingError> {
        self.request(
            Method::POST,
            &["v1", "payment_methods", payment_method_id, "detach"],
            &[],
            None,
        )
        .await
    }
}
