//! Fixtures and a recording provider shared by the unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use polar_billing_shared::{Price, Product, Subscription};
use time::macros::datetime;

use crate::client::{PolarConfig, PolarServer};
use crate::error::{BillingError, BillingResult};
use crate::provider::{
    BillingProvider, Checkout, CreateCheckout, CustomerSession, Pagination, ProductPage,
    ProviderCustomer,
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

pub fn test_config() -> PolarConfig {
    let mut products = HashMap::new();
    products.insert("premium".to_string(), "prod_premium".to_string());
    products.insert("basic".to_string(), "prod_basic".to_string());

    PolarConfig {
        access_token: "polar_oat_test".to_string(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        server: PolarServer::Sandbox,
        organization_id: Some("org_1".to_string()),
        success_url: Some("https://app.example.com/billing/success".to_string()),
        products,
    }
}

pub fn product(id: &str, archived: bool) -> Product {
    Product {
        id: id.to_string(),
        organization_id: "org_1".to_string(),
        name: format!("Product {}", id),
        description: None,
        recurring_interval: Some("month".to_string()),
        is_recurring: true,
        is_archived: archived,
        created_at: datetime!(2024-01-01 0:00 UTC),
        modified_at: None,
        prices: vec![Price {
            id: format!("price_{}", id),
            product_id: id.to_string(),
            amount_type: "fixed".to_string(),
            is_archived: false,
            created_at: datetime!(2024-01-01 0:00 UTC),
            modified_at: None,
            recurring_interval: Some("month".to_string()),
            price_amount: Some(1000),
            price_currency: Some("usd".to_string()),
            price_type: Some("recurring".to_string()),
        }],
        medias: vec![],
    }
}

/// Active, renewing subscription with no end date
pub fn subscription(id: &str, customer_id: &str, product_id: &str) -> Subscription {
    Subscription {
        id: id.to_string(),
        customer_id: customer_id.to_string(),
        product_id: product_id.to_string(),
        price_id: Some(format!("price_{}", product_id)),
        checkout_id: None,
        status: Subscription::STATUS_ACTIVE.to_string(),
        amount: Some(1000),
        currency: Some("usd".to_string()),
        recurring_interval: Some("month".to_string()),
        cancel_at_period_end: false,
        current_period_start: datetime!(2024-01-01 0:00 UTC),
        current_period_end: Some(datetime!(2024-02-01 0:00 UTC)),
        started_at: Some(datetime!(2024-01-01 0:00 UTC)),
        ended_at: None,
        created_at: datetime!(2024-01-01 0:00 UTC),
        modified_at: None,
        metadata: serde_json::json!({}),
    }
}

#[derive(Default)]
struct Calls {
    created_customers: Vec<String>,
    checkouts: Vec<CreateCheckout>,
    sessions: Vec<String>,
    revoked: Vec<String>,
    product_updates: Vec<(String, String)>,
    cancels: Vec<String>,
}

/// In-process provider that records every call
#[derive(Default)]
pub struct RecordingProvider {
    calls: Mutex<Calls>,
    /// Subscription IDs whose revoke call fails
    pub failing_revokes: Vec<String>,
    /// Catalog pages served by `list_products`, 1-based
    pub product_pages: Vec<Vec<Product>>,
}

impl RecordingProvider {
    pub fn with_failing_revokes(ids: &[&str]) -> Self {
        Self {
            failing_revokes: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_product_pages(pages: Vec<Vec<Product>>) -> Self {
        Self {
            product_pages: pages,
            ..Default::default()
        }
    }

    pub fn created_customers(&self) -> Vec<String> {
        self.calls.lock().unwrap().created_customers.clone()
    }

    pub fn checkouts(&self) -> Vec<CreateCheckout> {
        self.calls.lock().unwrap().checkouts.clone()
    }

    pub fn sessions(&self) -> Vec<String> {
        self.calls.lock().unwrap().sessions.clone()
    }

    pub fn revoked(&self) -> Vec<String> {
        self.calls.lock().unwrap().revoked.clone()
    }

    pub fn product_updates(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().product_updates.clone()
    }

    pub fn cancels(&self) -> Vec<String> {
        self.calls.lock().unwrap().cancels.clone()
    }
}

#[async_trait]
impl BillingProvider for RecordingProvider {
    async fn create_customer(&self, email: &str, user_id: &str) -> BillingResult<ProviderCustomer> {
        let mut calls = self.calls.lock().unwrap();
        calls.created_customers.push(user_id.to_string());
        Ok(ProviderCustomer {
            id: format!("cus_{}", calls.created_customers.len()),
            email: Some(email.to_string()),
            metadata: serde_json::json!({ "userId": user_id }),
        })
    }

    async fn create_checkout(&self, params: CreateCheckout) -> BillingResult<Checkout> {
        let mut calls = self.calls.lock().unwrap();
        calls.checkouts.push(params);
        let n = calls.checkouts.len();
        Ok(Checkout {
            id: format!("chk_{}", n),
            url: format!("https://sandbox.polar.sh/checkout/chk_{}", n),
        })
    }

    async fn create_customer_session(&self, customer_id: &str) -> BillingResult<CustomerSession> {
        self.calls.lock().unwrap().sessions.push(customer_id.to_string());
        Ok(CustomerSession {
            customer_portal_url: format!("https://sandbox.polar.sh/portal/{}", customer_id),
        })
    }

    async fn revoke_subscription(&self, subscription_id: &str) -> BillingResult<()> {
        if self.failing_revokes.iter().any(|id| id == subscription_id) {
            return Err(BillingError::ProviderApi {
                status: 500,
                message: "revoke failed".to_string(),
            });
        }
        self.calls.lock().unwrap().revoked.push(subscription_id.to_string());
        Ok(())
    }

    async fn update_subscription_product(
        &self,
        subscription_id: &str,
        product_id: &str,
    ) -> BillingResult<()> {
        self.calls
            .lock()
            .unwrap()
            .product_updates
            .push((subscription_id.to_string(), product_id.to_string()));
        Ok(())
    }

    async fn cancel_subscription_at_period_end(&self, subscription_id: &str) -> BillingResult<()> {
        self.calls.lock().unwrap().cancels.push(subscription_id.to_string());
        Ok(())
    }

    async fn list_products(&self, page: u32) -> BillingResult<ProductPage> {
        let items = self
            .product_pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default();
        Ok(ProductPage {
            items,
            pagination: Pagination {
                total_count: self.product_pages.iter().map(|p| p.len() as u64).sum(),
                max_page: self.product_pages.len() as u32,
            },
        })
    }
}
