use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::billing::{SubscriptionSnapshot, SubscriptionStatus};

/// key: users-model -> identity plus cached billing state
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i32,
    pub email: String,
    pub name: Option<String>,
    pub billing_customer_id: Option<String>,
    pub subscription: Option<SubscriptionSnapshot>,
}

/// key: users-store -> record access used by billing reconciliation
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: i32) -> Result<Option<User>, sqlx::Error>;

    async fn find_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<User>, sqlx::Error>;

    async fn set_billing_customer(&self, user_id: i32, customer_id: &str)
        -> Result<(), sqlx::Error>;

    /// Stores `snapshot` unless the one on file was refreshed later.
    /// Returns whether it was written.
    async fn save_subscription_snapshot(
        &self,
        user_id: i32,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<bool, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, name, billing_customer_id, subscription_id, \
    subscription_status, subscription_plan, subscription_refreshed_at";

fn user_from_row(row: &PgRow) -> User {
    let refreshed_at: Option<DateTime<Utc>> = row.get("subscription_refreshed_at");
    let subscription = refreshed_at.map(|refreshed_at| SubscriptionSnapshot {
        subscription_id: row.get("subscription_id"),
        status: row
            .get::<Option<String>, _>("subscription_status")
            .map(|status| SubscriptionStatus::parse(&status)),
        plan: row.get("subscription_plan"),
        refreshed_at,
    });
    User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        billing_customer_id: row.get("billing_customer_id"),
        subscription,
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_user(&self, user_id: i32) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_billing_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE billing_customer_id = $1"
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn set_billing_customer(
        &self,
        user_id: i32,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET billing_customer_id = $2 WHERE id = $1")
            .bind(user_id)
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_subscription_snapshot(
        &self,
        user_id: i32,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                subscription_id = $2,
                subscription_status = $3,
                subscription_plan = $4,
                subscription_refreshed_at = $5
            WHERE id = $1
              AND (subscription_refreshed_at IS NULL OR subscription_refreshed_at <= $5)
            "#,
        )
        .bind(user_id)
        .bind(snapshot.subscription_id.as_deref())
        .bind(snapshot.status.map(|status| status.as_str()))
        .bind(snapshot.plan.as_deref())
        .bind(snapshot.refreshed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
