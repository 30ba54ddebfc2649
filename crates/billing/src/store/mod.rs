//! Billing record store
//!
//! Customers, products and subscriptions are addressed by the IDs Polar
//! issues. `PgStore` is the production backend; `MemoryStore` keeps the same
//! semantics in-process for development and tests.

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use polar_billing_shared::{
    Customer, Product, Subscription, SubscriptionWithOptionalProduct, SubscriptionWithProduct,
};
use time::OffsetDateTime;

use crate::error::BillingResult;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence operations used by the billing services and webhook handler
///
/// Each method is a single atomic unit against the backing store.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn get_customer_by_user_id(&self, user_id: &str) -> BillingResult<Option<Customer>>;

    /// Plain insert; a second customer for the same user is `AlreadyExists`
    async fn insert_customer(&self, customer: &Customer) -> BillingResult<()>;

    /// Return the customer ID already mapped to `user_id`, or map `customer_id`
    /// to it. Concurrent callers converge on one row.
    async fn upsert_customer(&self, user_id: &str, customer_id: &str) -> BillingResult<String>;

    async fn get_subscription(&self, id: &str) -> BillingResult<Option<Subscription>>;

    async fn get_product(&self, id: &str) -> BillingResult<Option<Product>>;

    /// The user's subscription with no end date, joined with its product
    ///
    /// A missing product is a `DataIntegrity` error.
    async fn get_current_subscription(
        &self,
        user_id: &str,
    ) -> BillingResult<Option<SubscriptionWithProduct>>;

    /// Subscriptions not ended as of `now`, in insertion order
    async fn list_user_subscriptions(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> BillingResult<Vec<SubscriptionWithOptionalProduct>>;

    async fn list_products(&self, include_archived: bool) -> BillingResult<Vec<Product>>;

    /// Insert if absent; returns false when a row with this ID already exists
    async fn create_subscription(&self, subscription: &Subscription) -> BillingResult<bool>;

    /// Overwrite every mutable field; `SubscriptionNotFound` if absent
    async fn update_subscription(&self, subscription: &Subscription) -> BillingResult<()>;

    /// Insert if absent; returns false when a row with this ID already exists
    async fn create_product(&self, product: &Product) -> BillingResult<bool>;

    /// Overwrite every mutable field; `ProductNotFound` if absent
    async fn update_product(&self, product: &Product) -> BillingResult<()>;

    /// Insert or overwrite
    async fn upsert_product(&self, product: &Product) -> BillingResult<()>;

    /// All subscriptions of a customer, in insertion order
    async fn list_customer_subscriptions(
        &self,
        customer_id: &str,
    ) -> BillingResult<Vec<Subscription>>;
}

pub type SharedStore = Arc<dyn BillingStore>;
