//! Postgres-backed billing store

use std::collections::HashMap;

use async_trait::async_trait;
use polar_billing_shared::{
    Customer, Product, Subscription, SubscriptionWithOptionalProduct, SubscriptionWithProduct,
};
use sqlx::types::Json;
use sqlx::PgPool;
use time::OffsetDateTime;

use super::BillingStore;
use crate::error::{BillingError, BillingResult};

const SUBSCRIPTION_COLUMNS: &str = r#"
    s.id, s.customer_id, s.product_id, s.price_id, s.checkout_id, s.status,
    s.amount, s.currency, s.recurring_interval, s.cancel_at_period_end,
    s.current_period_start, s.current_period_end, s.started_at, s.ended_at,
    s.created_at, s.modified_at, s.metadata
"#;

const PRODUCT_COLUMNS: &str = r#"
    id, organization_id, name, description, recurring_interval, is_recurring,
    is_archived, created_at, modified_at, prices, medias
"#;

/// Billing store on the `billing_*` tables
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn get_customer_by_user_id(&self, user_id: &str) -> BillingResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT id, user_id, metadata FROM billing_customers WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(customer)
    }

    async fn insert_customer(&self, customer: &Customer) -> BillingResult<()> {
        sqlx::query("INSERT INTO billing_customers (id, user_id, metadata) VALUES ($1, $2, $3)")
            .bind(&customer.id)
            .bind(&customer.user_id)
            .bind(&customer.metadata)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn upsert_customer(&self, user_id: &str, customer_id: &str) -> BillingResult<String> {
        // The unique index on user_id turns a lost race into a no-op insert
        let inserted: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO billing_customers (id, user_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(customer_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = inserted {
            tracing::info!(user_id = %user_id, customer_id = %id, "Stored customer mapping");
            return Ok(id);
        }

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM billing_customers WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        existing.map(|(id,)| id).ok_or_else(|| {
            BillingError::DataIntegrity(format!(
                "Customer {} is already mapped to another user",
                customer_id
            ))
        })
    }

    async fn get_subscription(&self, id: &str) -> BillingResult<Option<Subscription>> {
        let query = format!(
            "SELECT {} FROM billing_subscriptions s WHERE s.id = $1",
            SUBSCRIPTION_COLUMNS
        );
        let subscription = sqlx::query_as::<_, Subscription>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(subscription)
    }

    async fn get_product(&self, id: &str) -> BillingResult<Option<Product>> {
        let query = format!("SELECT {} FROM billing_products WHERE id = $1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    async fn get_current_subscription(
        &self,
        user_id: &str,
    ) -> BillingResult<Option<SubscriptionWithProduct>> {
        let query = format!(
            r#"
            SELECT {}
            FROM billing_subscriptions s
            JOIN billing_customers c ON c.id = s.customer_id
            WHERE c.user_id = $1 AND s.ended_at IS NULL
            ORDER BY s.seq DESC
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let current = sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        let Some(subscription) = pick_current(user_id, current) else {
            return Ok(None);
        };

        let product = self.get_product(&subscription.product_id).await?.ok_or_else(|| {
            BillingError::DataIntegrity(format!("Product not found: {}", subscription.product_id))
        })?;

        Ok(Some(SubscriptionWithProduct {
            subscription,
            product,
        }))
    }

    async fn list_user_subscriptions(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> BillingResult<Vec<SubscriptionWithOptionalProduct>> {
        let query = format!(
            r#"
            SELECT {}
            FROM billing_subscriptions s
            JOIN billing_customers c ON c.id = s.customer_id
            WHERE c.user_id = $1 AND (s.ended_at IS NULL OR s.ended_at > $2)
            ORDER BY s.seq ASC
            "#,
            SUBSCRIPTION_COLUMNS
        );
        let subscriptions = sqlx::query_as::<_, Subscription>(&query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        if subscriptions.is_empty() {
            return Ok(Vec::new());
        }

        let product_ids: Vec<String> = subscriptions.iter().map(|s| s.product_id.clone()).collect();
        let query = format!(
            "SELECT {} FROM billing_products WHERE id = ANY($1)",
            PRODUCT_COLUMNS
        );
        let products: HashMap<String, Product> = sqlx::query_as::<_, Product>(&query)
            .bind(&product_ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        Ok(subscriptions
            .into_iter()
            .map(|subscription| {
                let product = products.get(&subscription.product_id).cloned();
                SubscriptionWithOptionalProduct {
                    subscription,
                    product,
                }
            })
            .collect())
    }

    async fn list_products(&self, include_archived: bool) -> BillingResult<Vec<Product>> {
        let query = format!(
            "SELECT {} FROM billing_products WHERE ($1 OR is_archived = FALSE) ORDER BY seq ASC",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&query)
            .bind(include_archived)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    async fn create_subscription(&self, subscription: &Subscription) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_subscriptions (
                id, customer_id, product_id, price_id, checkout_id, status,
                amount, currency, recurring_interval, cancel_at_period_end,
                current_period_start, current_period_end, started_at, ended_at,
                created_at, modified_at, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.customer_id)
        .bind(&subscription.product_id)
        .bind(&subscription.price_id)
        .bind(&subscription.checkout_id)
        .bind(&subscription.status)
        .bind(subscription.amount)
        .bind(&subscription.currency)
        .bind(&subscription.recurring_interval)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.started_at)
        .bind(subscription.ended_at)
        .bind(subscription.created_at)
        .bind(subscription.modified_at)
        .bind(&subscription.metadata)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_subscription(&self, subscription: &Subscription) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE billing_subscriptions SET
                customer_id = $2, product_id = $3, price_id = $4, checkout_id = $5,
                status = $6, amount = $7, currency = $8, recurring_interval = $9,
                cancel_at_period_end = $10, current_period_start = $11,
                current_period_end = $12, started_at = $13, ended_at = $14,
                created_at = $15, modified_at = $16, metadata = $17
            WHERE id = $1
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.customer_id)
        .bind(&subscription.product_id)
        .bind(&subscription.price_id)
        .bind(&subscription.checkout_id)
        .bind(&subscription.status)
        .bind(subscription.amount)
        .bind(&subscription.currency)
        .bind(&subscription.recurring_interval)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.started_at)
        .bind(subscription.ended_at)
        .bind(subscription.created_at)
        .bind(subscription.modified_at)
        .bind(&subscription.metadata)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::SubscriptionNotFound(subscription.id.clone()));
        }
        Ok(())
    }

    async fn create_product(&self, product: &Product) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_products (
                id, organization_id, name, description, recurring_interval,
                is_recurring, is_archived, created_at, modified_at, prices, medias
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&product.id)
        .bind(&product.organization_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.recurring_interval)
        .bind(product.is_recurring)
        .bind(product.is_archived)
        .bind(product.created_at)
        .bind(product.modified_at)
        .bind(Json(&product.prices))
        .bind(Json(&product.medias))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_product(&self, product: &Product) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE billing_products SET
                organization_id = $2, name = $3, description = $4,
                recurring_interval = $5, is_recurring = $6, is_archived = $7,
                created_at = $8, modified_at = $9, prices = $10, medias = $11
            WHERE id = $1
            "#,
        )
        .bind(&product.id)
        .bind(&product.organization_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.recurring_interval)
        .bind(product.is_recurring)
        .bind(product.is_archived)
        .bind(product.created_at)
        .bind(product.modified_at)
        .bind(Json(&product.prices))
        .bind(Json(&product.medias))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::ProductNotFound(product.id.clone()));
        }
        Ok(())
    }

    async fn upsert_product(&self, product: &Product) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO billing_products (
                id, organization_id, name, description, recurring_interval,
                is_recurring, is_archived, created_at, modified_at, prices, medias
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                organization_id = EXCLUDED.organization_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                recurring_interval = EXCLUDED.recurring_interval,
                is_recurring = EXCLUDED.is_recurring,
                is_archived = EXCLUDED.is_archived,
                created_at = EXCLUDED.created_at,
                modified_at = EXCLUDED.modified_at,
                prices = EXCLUDED.prices,
                medias = EXCLUDED.medias
            "#,
        )
        .bind(&product.id)
        .bind(&product.organization_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.recurring_interval)
        .bind(product.is_recurring)
        .bind(product.is_archived)
        .bind(product.created_at)
        .bind(product.modified_at)
        .bind(Json(&product.prices))
        .bind(Json(&product.medias))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_customer_subscriptions(
        &self,
        customer_id: &str,
    ) -> BillingResult<Vec<Subscription>> {
        let query = format!(
            "SELECT {} FROM billing_subscriptions s WHERE s.customer_id = $1 ORDER BY s.seq ASC",
            SUBSCRIPTION_COLUMNS
        );
        let subscriptions = sqlx::query_as::<_, Subscription>(&query)
            .bind(customer_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(subscriptions)
    }
}

/// Choose the current subscription from rows ordered newest first
///
/// More than one open subscription means two `subscription.created` events
/// raced; the newest one wins.
pub(super) fn pick_current(user_id: &str, mut open: Vec<Subscription>) -> Option<Subscription> {
    if open.len() > 1 {
        tracing::warn!(
            user_id = %user_id,
            count = open.len(),
            "Multiple subscriptions without an end date; using the newest"
        );
    }
    if open.is_empty() {
        None
    } else {
        Some(open.swap_remove(0))
    }
}
