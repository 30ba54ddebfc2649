#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Polar Billing Module
//!
//! Mirrors a Polar organization's customers, products and subscriptions into
//! a local store and exposes checkout and portal helpers.
//!
//! ## Features
//!
//! - **Webhooks**: Verify Standard Webhooks signatures and apply subscription and product events
//! - **Single active subscription**: A new subscription revokes the customer's other renewing ones
//! - **Checkout**: Create embedded checkout sessions for configured product keys
//! - **Portal**: Mint customer portal URLs
//! - **Catalog sync**: Page through the provider catalog into the store

pub mod checkout;
pub mod client;
pub mod customer;
pub mod error;
pub mod portal;
pub mod products;
pub mod provider;
pub mod store;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod testing;

// Checkout
pub use checkout::{CheckoutLink, CheckoutService};

// Client
pub use client::{PolarClient, PolarConfig, PolarServer, USER_ID_METADATA_KEY};

// Customer
pub use customer::{CustomerService, UserInfo};

// Error
pub use error::{BillingError, BillingResult};

// Portal
pub use portal::{PortalResponse, PortalService};

// Products
pub use products::ProductService;

// Provider
pub use provider::{BillingProvider, SharedProvider};

// Store
pub use store::{BillingStore, MemoryStore, PgStore, SharedStore};

// Subscriptions
pub use subscriptions::SubscriptionService;

// Webhooks
pub use webhooks::{
    verify_webhook, WebhookEvent, WebhookEventType, WebhookHandler, WebhookHeaders,
    WebhookOutcome,
};

use std::sync::Arc;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub checkout: CheckoutService,
    pub customer: CustomerService,
    pub portal: PortalService,
    pub products: ProductService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(store: SharedStore) -> BillingResult<Self> {
        let client = PolarClient::from_env()?;
        let config = client.config().clone();
        Ok(Self::new(Arc::new(client), store, config))
    }

    /// Create a new billing service with an explicit provider
    pub fn new(provider: SharedProvider, store: SharedStore, config: PolarConfig) -> Self {
        let customer = CustomerService::new(provider.clone(), store.clone());

        Self {
            checkout: CheckoutService::new(provider.clone(), customer.clone(), config.clone()),
            portal: PortalService::new(provider.clone(), customer.clone()),
            products: ProductService::new(provider.clone(), store.clone()),
            subscriptions: SubscriptionService::new(provider.clone(), store.clone(), config.clone()),
            webhooks: WebhookHandler::new(provider, store, config.webhook_secret),
            customer,
        }
    }
}
