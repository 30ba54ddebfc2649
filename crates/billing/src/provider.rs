//! Billing provider abstraction
//!
//! Every outbound call to the billing provider goes through this trait so the
//! webhook handler and the checkout/portal services can be driven by a fake
//! provider in tests.

use std::sync::Arc;

use async_trait::async_trait;
use polar_billing_shared::Product;
use serde::{Deserialize, Serialize};

use crate::error::BillingResult;

/// Customer as returned by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCustomer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Parameters for a new checkout session
#[derive(Debug, Clone, Serialize)]
pub struct CreateCheckout {
    pub products: Vec<String>,
    pub customer_id: String,
    pub embed_origin: String,
    pub allow_discount_codes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
}

/// Checkout session created by the provider
#[derive(Debug, Clone, Deserialize)]
pub struct Checkout {
    pub id: String,
    pub url: String,
}

/// Short-lived customer portal session
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerSession {
    pub customer_portal_url: String,
}

/// One page of the provider's product catalog
#[derive(Debug, Clone, Deserialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    pub total_count: u64,
    pub max_page: u32,
}

/// Remote billing provider operations
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Create a provider customer tagged with the application user ID
    async fn create_customer(&self, email: &str, user_id: &str) -> BillingResult<ProviderCustomer>;

    /// Create a checkout session
    async fn create_checkout(&self, params: CreateCheckout) -> BillingResult<Checkout>;

    /// Create a customer portal session
    async fn create_customer_session(&self, customer_id: &str) -> BillingResult<CustomerSession>;

    /// Revoke a subscription immediately
    async fn revoke_subscription(&self, subscription_id: &str) -> BillingResult<()>;

    /// Move a subscription to another product
    async fn update_subscription_product(
        &self,
        subscription_id: &str,
        product_id: &str,
    ) -> BillingResult<()>;

    /// Schedule a subscription to cancel at the end of the current period
    async fn cancel_subscription_at_period_end(&self, subscription_id: &str) -> BillingResult<()>;

    /// Fetch one page (1-based) of the organization's products
    async fn list_products(&self, page: u32) -> BillingResult<ProductPage>;
}

pub type SharedProvider = Arc<dyn BillingProvider>;
