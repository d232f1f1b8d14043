use axum::{routing::get, Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use signdesk::billing::{start_reconciliation_worker, PaymentMethodService, StripeAdapter};
use signdesk::config;
use signdesk::routes::{api_routes, root};
use signdesk::users::{PgUserStore, UserStore};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    // Fail fast if the JWT secret is missing
    let _ = config::JWT_SECRET.as_str();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config::DATABASE_URL.as_str())
        .await?;

    if let Err(error) = sqlx::migrate!().run(&pool).await {
        if *config::ALLOW_MIGRATION_FAILURE {
            tracing::warn!(
                ?error,
                "Database migrations failed but continuing due to ALLOW_MIGRATION_FAILURE"
            );
        } else {
            return Err(Box::new(error) as Box<dyn std::error::Error>);
        }
    }

    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let gateway = Arc::new(StripeAdapter::from_env()?);
    let payment_methods = Arc::new(PaymentMethodService::new(gateway, users.clone()));
    let reconciliation = start_reconciliation_worker(users);
    if config::BILLING_WEBHOOK_SECRET.is_none() {
        tracing::warn!("BILLING_WEBHOOK_SECRET not set; billing webhooks will be rejected");
    }

    let (prometheus_layer, metrics_handle) = PrometheusMetricLayer::pair();
    let app = Router::new()
        .route("/", get(root))
        .route(
            "/metrics",
            get(move || async move { metrics_handle.render() }),
        )
        .merge(api_routes())
        .layer(prometheus_layer)
        .layer(Extension(pool.clone()))
        .layer(Extension(payment_methods))
        .layer(Extension(reconciliation));

    let addr: SocketAddr = format!("{}:{}", config::BIND_ADDRESS.as_str(), *config::BIND_PORT)
        .parse()
        .map_err(|error| Box::new(error) as Box<dyn std::error::Error>)?;
    tracing::info!(%addr, "Listening for incoming connections");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
