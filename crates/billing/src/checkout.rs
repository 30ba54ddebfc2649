//! Polar checkout sessions

use serde::Serialize;

use crate::client::PolarConfig;
use crate::customer::{CustomerService, UserInfo};
use crate::error::{BillingError, BillingResult};
use crate::provider::{Checkout, CreateCheckout, SharedProvider};

/// Checkout service for creating Polar checkout sessions
#[derive(Clone)]
pub struct CheckoutService {
    provider: SharedProvider,
    customers: CustomerService,
    config: PolarConfig,
}

impl CheckoutService {
    pub fn new(provider: SharedProvider, customers: CustomerService, config: PolarConfig) -> Self {
        Self {
            provider,
            customers,
            config,
        }
    }

    /// Create a checkout session for a product, resolving the customer first
    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        email: &str,
        product_id: &str,
        origin: &str,
    ) -> BillingResult<Checkout> {
        let customer_id = self.customers.get_or_create_customer_id(user_id, email).await?;

        let params = CreateCheckout {
            products: vec![product_id.to_string()],
            customer_id,
            embed_origin: origin.to_string(),
            allow_discount_codes: true,
            success_url: self.config.success_url.clone(),
        };

        let checkout = self.provider.create_checkout(params).await?;

        tracing::info!(
            user_id = %user_id,
            checkout_id = %checkout.id,
            product_id = %product_id,
            "Created checkout session"
        );

        Ok(checkout)
    }

    /// Create a checkout link for a configured product key
    pub async fn generate_checkout_link(
        &self,
        user: &UserInfo,
        product_key: &str,
        origin: &str,
    ) -> BillingResult<CheckoutLink> {
        let product_id = self
            .config
            .product_id_for_key(product_key)
            .ok_or_else(|| BillingError::InvalidInput(format!("Unknown product key: {}", product_key)))?;

        if origin.trim().is_empty() {
            return Err(BillingError::InvalidInput("origin is required".to_string()));
        }

        let checkout = self
            .create_checkout_session(&user.user_id, &user.email, product_id, origin)
            .await?;

        Ok(CheckoutLink { url: checkout.url })
    }
}

/// Redirect URL for a checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLink {
    pub url: String,
}
