pub mod adapters;
pub mod api;
pub mod error;
pub mod models;
pub mod reconciliation;
pub mod service;

pub use adapters::{BillingGateway, StripeAdapter};
pub use api::routes;
pub use error::{BillingError, PaymentMethodError};
pub use models::{
    is_provider_id, AttachOutcome, Card, Customer, InvoiceSettings, PaymentMethod,
    PaymentMethodView, Subscription, SubscriptionSnapshot, SubscriptionStatus,
};
pub use reconciliation::{
    apply_job as apply_reconciliation_job, start_reconciliation_worker, ReconciliationHandle,
    ReconciliationJob, ReconciliationOutcome,
};
pub use service::PaymentMethodService;
