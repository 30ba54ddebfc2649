//! Provider stub and service wiring for router tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use polar_billing::provider::{
    Checkout, CreateCheckout, CustomerSession, Pagination, ProductPage, ProviderCustomer,
};
use polar_billing::{
    BillingProvider, BillingResult, BillingService, MemoryStore, PolarConfig, PolarServer,
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_router_test";

#[derive(Default)]
pub struct StubProvider {
    customers: Mutex<u32>,
    cancelled: Mutex<Vec<String>>,
}

impl StubProvider {
    pub fn customers_created(&self) -> u32 {
        *self.customers.lock().unwrap()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl BillingProvider for StubProvider {
    async fn create_customer(&self, email: &str, user_id: &str) -> BillingResult<ProviderCustomer> {
        let mut count = self.customers.lock().unwrap();
        *count += 1;
        Ok(ProviderCustomer {
            id: format!("cus_stub_{}", count),
            email: Some(email.to_string()),
            metadata: serde_json::json!({ "userId": user_id }),
        })
    }

    async fn create_checkout(&self, params: CreateCheckout) -> BillingResult<Checkout> {
        Ok(Checkout {
            id: "chk_stub".to_string(),
            url: format!("https://sandbox.polar.sh/checkout/{}", params.customer_id),
        })
    }

    async fn create_customer_session(&self, customer_id: &str) -> BillingResult<CustomerSession> {
        Ok(CustomerSession {
            customer_portal_url: format!("https://sandbox.polar.sh/portal/{}", customer_id),
        })
    }

    async fn revoke_subscription(&self, subscription_id: &str) -> BillingResult<()> {
        self.cancelled.lock().unwrap().push(subscription_id.to_string());
        Ok(())
    }

    async fn update_subscription_product(
        &self,
        _subscription_id: &str,
        _product_id: &str,
    ) -> BillingResult<()> {
        Ok(())
    }

    async fn cancel_subscription_at_period_end(&self, subscription_id: &str) -> BillingResult<()> {
        self.cancelled.lock().unwrap().push(subscription_id.to_string());
        Ok(())
    }

    async fn list_products(&self, _page: u32) -> BillingResult<ProductPage> {
        Ok(ProductPage {
            items: vec![],
            pagination: Pagination {
                total_count: 0,
                max_page: 1,
            },
        })
    }
}

pub fn test_billing(provider: Arc<StubProvider>, store: Arc<MemoryStore>) -> BillingService {
    let mut products = HashMap::new();
    products.insert("premium".to_string(), "prod_premium".to_string());

    let config = PolarConfig {
        access_token: "polar_oat_test".to_string(),
        webhook_secret: TEST_WEBHOOK_SECRET.to_string(),
        server: PolarServer::Sandbox,
        organization_id: None,
        success_url: None,
        products,
    };

    BillingService::new(provider, store, config)
}
