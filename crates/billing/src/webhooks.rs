//! Polar webhook handling
//!
//! Deliveries are signed with the Standard Webhooks scheme: the
//! `webhook-signature` header carries one or more `v1,<base64>` entries, each
//! an HMAC-SHA256 over `"{webhook-id}.{webhook-timestamp}.{body}"` keyed with
//! the UTF-8 bytes of the webhook secret. Verification runs on the raw body
//! before anything is parsed and a failed check touches nothing.
//!
//! Handled events:
//! - `subscription.created`: upsert the customer mapping, revoke the
//!   customer's other renewing subscriptions, insert the new row
//! - `subscription.updated`: overwrite the stored row
//! - `product.created` / `product.updated`: mirror the catalog entry
//!
//! Everything else is acknowledged and ignored.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use polar_billing_shared::{Product, Subscription};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::client::USER_ID_METADATA_KEY;
use crate::error::{BillingError, BillingResult};
use crate::provider::SharedProvider;
use crate::store::SharedStore;

type HmacSha256 = Hmac<Sha256>;

/// Maximum distance between the signed timestamp and the local clock
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

pub const HEADER_WEBHOOK_ID: &str = "webhook-id";
pub const HEADER_WEBHOOK_TIMESTAMP: &str = "webhook-timestamp";
pub const HEADER_WEBHOOK_SIGNATURE: &str = "webhook-signature";

/// The three signing headers of a delivery
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    pub id: Option<String>,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
}

impl WebhookHeaders {
    /// Collect the signing headers from any header source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            id: lookup(HEADER_WEBHOOK_ID),
            timestamp: lookup(HEADER_WEBHOOK_TIMESTAMP),
            signature: lookup(HEADER_WEBHOOK_SIGNATURE),
        }
    }
}

/// Check a delivery's signature against the shared secret
pub fn verify_webhook(
    body: &[u8],
    headers: &WebhookHeaders,
    secret: &str,
    now: OffsetDateTime,
) -> BillingResult<()> {
    let invalid = |reason: &str| BillingError::WebhookSignatureInvalid(reason.to_string());

    let id = headers.id.as_deref().ok_or_else(|| invalid("missing webhook-id"))?;
    let timestamp = headers
        .timestamp
        .as_deref()
        .ok_or_else(|| invalid("missing webhook-timestamp"))?;
    let signature = headers
        .signature
        .as_deref()
        .ok_or_else(|| invalid("missing webhook-signature"))?;

    let sent_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| invalid("malformed webhook-timestamp"))?;

    let skew = now
        .unix_timestamp()
        .checked_sub(sent_at)
        .map(i64::unsigned_abs)
        .ok_or_else(|| invalid("timestamp outside tolerance"))?;
    if skew > TIMESTAMP_TOLERANCE_SECS.unsigned_abs() {
        return Err(invalid("timestamp outside tolerance"));
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| invalid("unusable secret"))?;
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    let matched = signature
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == "v1")
        .filter_map(|(_, encoded)| STANDARD.decode(encoded).ok())
        .any(|candidate| bool::from(candidate.as_slice().ct_eq(expected.as_slice())));

    if !matched {
        return Err(invalid("no matching signature"));
    }

    Ok(())
}

/// Event types this service reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    SubscriptionCreated,
    SubscriptionUpdated,
    ProductCreated,
    ProductUpdated,
    Unknown(String),
}

impl WebhookEventType {
    pub fn parse(value: &str) -> Self {
        match value {
            "subscription.created" => Self::SubscriptionCreated,
            "subscription.updated" => Self::SubscriptionUpdated,
            "product.created" => Self::ProductCreated,
            "product.updated" => Self::ProductUpdated,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionCreated => "subscription.created",
            Self::SubscriptionUpdated => "subscription.updated",
            Self::ProductCreated => "product.created",
            Self::ProductUpdated => "product.updated",
            Self::Unknown(other) => other,
        }
    }
}

/// Verified delivery envelope
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub event_type: WebhookEventType,
    pub data: serde_json::Value,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> BillingResult<Self> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|e| BillingError::InvalidPayload(format!("Malformed event: {}", e)))?;
        Ok(Self {
            event_type: WebhookEventType::parse(&raw.event_type),
            data: raw.data,
        })
    }

    fn data_as<T: serde::de::DeserializeOwned>(&self) -> BillingResult<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            BillingError::InvalidPayload(format!("Invalid {} data: {}", self.event_type.as_str(), e))
        })
    }
}

/// Subscription as delivered, with the embedded customer
#[derive(Debug, Deserialize)]
struct SubscriptionPayload {
    #[serde(flatten)]
    subscription: Subscription,
    #[serde(default)]
    customer: Option<PayloadCustomer>,
}

#[derive(Debug, Deserialize)]
struct PayloadCustomer {
    id: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl PayloadCustomer {
    fn user_id(&self) -> Option<&str> {
        self.metadata
            .get(USER_ID_METADATA_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// What a delivery did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// The subscription already existed; nothing was done
    Replayed,
    Ignored,
}

/// Webhook handler for Polar events
#[derive(Clone)]
pub struct WebhookHandler {
    provider: SharedProvider,
    store: SharedStore,
    secret: String,
}

impl WebhookHandler {
    pub fn new(provider: SharedProvider, store: SharedStore, secret: impl Into<String>) -> Self {
        Self {
            provider,
            store,
            secret: secret.into(),
        }
    }

    /// Verify, parse and apply one delivery
    pub async fn handle(&self, body: &[u8], headers: &WebhookHeaders) -> BillingResult<WebhookOutcome> {
        self.handle_at(body, headers, OffsetDateTime::now_utc()).await
    }

    pub async fn handle_at(
        &self,
        body: &[u8],
        headers: &WebhookHeaders,
        now: OffsetDateTime,
    ) -> BillingResult<WebhookOutcome> {
        if body.is_empty() {
            return Err(BillingError::InvalidPayload("Empty body".to_string()));
        }

        if let Err(e) = verify_webhook(body, headers, &self.secret, now) {
            tracing::warn!(
                webhook_id = ?headers.id,
                error = %e,
                "Rejected webhook delivery"
            );
            return Err(e);
        }

        let event = WebhookEvent::parse(body)?;

        tracing::debug!(
            webhook_id = ?headers.id,
            event_type = %event.event_type.as_str(),
            "Verified webhook delivery"
        );

        self.handle_event(&event).await
    }

    /// Apply an already verified event
    pub async fn handle_event(&self, event: &WebhookEvent) -> BillingResult<WebhookOutcome> {
        match &event.event_type {
            WebhookEventType::SubscriptionCreated => {
                self.handle_subscription_created(event.data_as()?).await
            }
            WebhookEventType::SubscriptionUpdated => {
                let payload: SubscriptionPayload = event.data_as()?;
                self.handle_subscription_updated(payload.subscription).await
            }
            WebhookEventType::ProductCreated => self.handle_product_created(event.data_as()?).await,
            WebhookEventType::ProductUpdated => self.handle_product_updated(event.data_as()?).await,
            WebhookEventType::Unknown(event_type) => {
                tracing::debug!(event_type = %event_type, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn handle_subscription_created(
        &self,
        payload: SubscriptionPayload,
    ) -> BillingResult<WebhookOutcome> {
        let subscription = payload.subscription;

        if self.store.get_subscription(&subscription.id).await?.is_some() {
            tracing::info!(
                subscription_id = %subscription.id,
                "Subscription already recorded, skipping replayed delivery"
            );
            return Ok(WebhookOutcome::Replayed);
        }

        if let Some(customer) = &payload.customer {
            if let Some(user_id) = customer.user_id() {
                match self.store.upsert_customer(user_id, &customer.id).await {
                    Ok(stored) if stored != customer.id => tracing::warn!(
                        user_id = %user_id,
                        stored_customer_id = %stored,
                        payload_customer_id = %customer.id,
                        "User already mapped to a different customer"
                    ),
                    Ok(_) => {}
                    Err(BillingError::DataIntegrity(reason)) => tracing::warn!(
                        user_id = %user_id,
                        customer_id = %customer.id,
                        reason = %reason,
                        "Customer mapping conflict, recording subscription anyway"
                    ),
                    Err(e) => return Err(e),
                }
            }
        }

        self.revoke_other_subscriptions(&subscription).await?;

        let inserted = self.store.create_subscription(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            customer_id = %subscription.customer_id,
            product_id = %subscription.product_id,
            status = %subscription.status,
            inserted,
            "Subscription created"
        );

        Ok(if inserted {
            WebhookOutcome::Processed
        } else {
            WebhookOutcome::Replayed
        })
    }

    /// Revoke every other renewing subscription of the same customer
    ///
    /// Failures are logged and do not stop the new subscription from being
    /// recorded.
    async fn revoke_other_subscriptions(&self, subscription: &Subscription) -> BillingResult<()> {
        let existing = self
            .store
            .list_customer_subscriptions(&subscription.customer_id)
            .await?;

        for other in existing
            .iter()
            .filter(|s| s.id != subscription.id && s.is_active_and_renewing())
        {
            match self.provider.revoke_subscription(&other.id).await {
                Ok(()) => tracing::info!(
                    subscription_id = %other.id,
                    replaced_by = %subscription.id,
                    "Revoked superseded subscription"
                ),
                Err(e) => tracing::warn!(
                    subscription_id = %other.id,
                    replaced_by = %subscription.id,
                    error = %e,
                    "Failed to revoke superseded subscription"
                ),
            }
        }

        Ok(())
    }

    async fn handle_subscription_updated(
        &self,
        subscription: Subscription,
    ) -> BillingResult<WebhookOutcome> {
        if let Err(e) = self.store.update_subscription(&subscription).await {
            tracing::error!(
                subscription_id = %subscription.id,
                error = %e,
                "Failed to apply subscription update"
            );
            return Err(e);
        }

        tracing::info!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            cancel_at_period_end = subscription.cancel_at_period_end,
            "Subscription updated"
        );

        Ok(WebhookOutcome::Processed)
    }

    async fn handle_product_created(&self, product: Product) -> BillingResult<WebhookOutcome> {
        let inserted = self.store.create_product(&product).await?;
        tracing::info!(product_id = %product.id, inserted, "Product created");
        Ok(if inserted {
            WebhookOutcome::Processed
        } else {
            WebhookOutcome::Replayed
        })
    }

    async fn handle_product_updated(&self, product: Product) -> BillingResult<WebhookOutcome> {
        if let Err(e) = self.store.update_product(&product).await {
            tracing::error!(product_id = %product.id, error = %e, "Failed to apply product update");
            return Err(e);
        }
        tracing::info!(product_id = %product.id, "Product updated");
        Ok(WebhookOutcome::Processed)
    }
}

/// Sign a body the way Polar does, for tests and local tooling
pub fn sign_webhook(secret: &str, id: &str, timestamp: i64, body: &[u8]) -> BillingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| BillingError::Config("unusable webhook secret".to_string()))?;
    mac.update(format!("{}.{}.", id, timestamp).as_bytes());
    mac.update(body);
    Ok(format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes())))
}
