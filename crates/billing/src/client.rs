//! Polar client configuration and REST client

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{BillingError, BillingResult};
use crate::provider::{
    BillingProvider, Checkout, CreateCheckout, CustomerSession, ProductPage, ProviderCustomer,
};

/// Metadata key linking a provider customer back to the application user
pub const USER_ID_METADATA_KEY: &str = "userId";

const PRODUCTS_PAGE_LIMIT: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Polar environment selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolarServer {
    #[default]
    Sandbox,
    Production,
}

impl PolarServer {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sandbox" => Some(Self::Sandbox),
            "production" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox-api.polar.sh",
            Self::Production => "https://api.polar.sh",
        }
    }
}

/// Configuration for Polar billing
#[derive(Debug, Clone)]
pub struct PolarConfig {
    /// Organization access token
    pub access_token: String,
    /// Webhook signing secret
    pub webhook_secret: String,
    pub server: PolarServer,
    /// Organization whose catalog is synced
    pub organization_id: Option<String>,
    /// Redirect after a completed checkout
    pub success_url: Option<String>,
    /// Application product keys mapped to Polar product IDs
    pub products: HashMap<String, String>,
}

impl PolarConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable source
    ///
    /// The access token and webhook secret are required: an empty value is
    /// rejected here instead of surfacing later as failed signature checks.
    pub fn from_lookup<F>(lookup: F) -> BillingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> BillingResult<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BillingError::Config(format!("{} not set", key)))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server = match optional("POLAR_SERVER") {
            Some(value) => PolarServer::from_str(&value).ok_or_else(|| {
                BillingError::Config(format!(
                    "POLAR_SERVER must be 'sandbox' or 'production', got '{}'",
                    value
                ))
            })?,
            None => PolarServer::default(),
        };

        let products = match optional("POLAR_PRODUCTS") {
            Some(value) => parse_product_keys(&value)?,
            None => HashMap::new(),
        };

        Ok(Self {
            access_token: required("POLAR_ORGANIZATION_TOKEN")?,
            webhook_secret: required("POLAR_WEBHOOK_SECRET")?,
            server,
            organization_id: optional("POLAR_ORGANIZATION_ID"),
            success_url: optional("POLAR_SUCCESS_URL"),
            products,
        })
    }

    /// Get the Polar product ID for an application product key
    pub fn product_id_for_key(&self, key: &str) -> Option<&str> {
        self.products.get(key).map(String::as_str)
    }
}

/// Parse `key=product_id` pairs separated by commas
fn parse_product_keys(value: &str) -> BillingResult<HashMap<String, String>> {
    let mut products = HashMap::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, id) = entry
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .ok_or_else(|| {
                BillingError::Config(format!("Invalid POLAR_PRODUCTS entry: '{}'", entry))
            })?;
        products.insert(key.to_string(), id.to_string());
    }
    Ok(products)
}

/// Polar REST client
#[derive(Clone)]
pub struct PolarClient {
    client: Client,
    base_url: String,
    config: PolarConfig,
}

impl PolarClient {
    /// Create a new Polar client from config
    pub fn new(config: PolarConfig) -> BillingResult<Self> {
        let base_url = config.server.base_url().to_string();
        Self::with_base_url(config, base_url)
    }

    /// Create a client against a custom API base URL
    pub fn with_base_url(config: PolarConfig, base_url: impl Into<String>) -> BillingResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config,
        })
    }

    /// Create a new Polar client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Self::new(PolarConfig::from_env()?)
    }

    /// Get the config
    pub fn config(&self) -> &PolarConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.config.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> BillingResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Polar API returned error status");
            return Err(BillingError::ProviderApi {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> BillingResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| BillingError::Http(format!("Failed to parse Polar response: {}", e)))
    }
}

#[async_trait]
impl BillingProvider for PolarClient {
    async fn create_customer(&self, email: &str, user_id: &str) -> BillingResult<ProviderCustomer> {
        let body = json!({
            "email": email,
            "metadata": { USER_ID_METADATA_KEY: user_id },
        });
        let customer: ProviderCustomer = self
            .send_json(self.request(Method::POST, "/v1/customers/").json(&body))
            .await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created Polar customer"
        );

        Ok(customer)
    }

    async fn create_checkout(&self, params: CreateCheckout) -> BillingResult<Checkout> {
        let checkout: Checkout = self
            .send_json(self.request(Method::POST, "/v1/checkouts/").json(&params))
            .await?;

        tracing::info!(
            checkout_id = %checkout.id,
            customer_id = %params.customer_id,
            "Created Polar checkout"
        );

        Ok(checkout)
    }

    async fn create_customer_session(&self, customer_id: &str) -> BillingResult<CustomerSession> {
        let body = json!({ "customer_id": customer_id });
        self.send_json(self.request(Method::POST, "/v1/customer-sessions/").json(&body))
            .await
    }

    async fn revoke_subscription(&self, subscription_id: &str) -> BillingResult<()> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        self.send(self.request(Method::DELETE, &path)).await?;

        tracing::info!(subscription_id = %subscription_id, "Revoked Polar subscription");
        Ok(())
    }

    async fn update_subscription_product(
        &self,
        subscription_id: &str,
        product_id: &str,
    ) -> BillingResult<()> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let body = json!({ "product_id": product_id });
        self.send(self.request(Method::PATCH, &path).json(&body))
            .await?;

        tracing::info!(
            subscription_id = %subscription_id,
            product_id = %product_id,
            "Changed Polar subscription product"
        );
        Ok(())
    }

    async fn cancel_subscription_at_period_end(&self, subscription_id: &str) -> BillingResult<()> {
        let path = format!("/v1/subscriptions/{}", subscription_id);
        let body = json!({ "cancel_at_period_end": true });
        self.send(self.request(Method::PATCH, &path).json(&body))
            .await?;

        tracing::info!(
            subscription_id = %subscription_id,
            "Scheduled Polar subscription cancellation"
        );
        Ok(())
    }

    async fn list_products(&self, page: u32) -> BillingResult<ProductPage> {
        let organization_id = self.config.organization_id.as_deref().ok_or_else(|| {
            BillingError::Config("POLAR_ORGANIZATION_ID not set".to_string())
        })?;

        let request = self.request(Method::GET, "/v1/products/").query(&[
            ("organization_id", organization_id.to_string()),
            ("page", page.to_string()),
            ("limit", PRODUCTS_PAGE_LIMIT.to_string()),
        ]);
        self.send_json(request).await
    }
}
