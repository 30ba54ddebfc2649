//! Record types persisted by the billing store
//!
//! Field names follow the provider's wire format (snake_case), so webhook
//! payloads and catalog listings deserialize straight into these rows.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Customer
// =============================================================================

/// Maps an application user to the provider's customer identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    /// Provider-assigned customer ID
    pub id: String,
    /// Owning application user (unique)
    pub user_id: String,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

impl Customer {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            metadata: empty_object(),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// Local copy of a provider product; overwritten wholesale on every update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recurring_interval: Option<String>,
    pub is_recurring: bool,
    pub is_archived: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
    #[serde(default)]
    #[sqlx(json)]
    pub prices: Vec<Price>,
    /// Media attachments, kept opaque
    #[serde(default)]
    #[sqlx(json)]
    pub medias: Vec<serde_json::Value>,
}

/// A price attached to a product (stored inside the product row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    pub product_id: String,
    /// fixed, custom or free
    pub amount_type: String,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub recurring_interval: Option<String>,
    #[serde(default)]
    pub price_amount: Option<i64>,
    #[serde(default)]
    pub price_currency: Option<String>,
    /// one_time or recurring
    #[serde(default, rename = "type")]
    pub price_type: Option<String>,
}

// =============================================================================
// Subscription
// =============================================================================

/// Local mirror of a provider subscription
///
/// `ended_at == None` means the subscription is current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub product_id: String,
    #[serde(default)]
    pub price_id: Option<String>,
    #[serde(default)]
    pub checkout_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub recurring_interval: Option<String>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub current_period_start: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub modified_at: Option<OffsetDateTime>,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

impl Subscription {
    /// Provider status string for a live, paid subscription
    pub const STATUS_ACTIVE: &'static str = "active";

    /// Whether this subscription should be revoked when a newer one is
    /// created for the same customer
    pub fn is_active_and_renewing(&self) -> bool {
        self.status == Self::STATUS_ACTIVE && !self.cancel_at_period_end
    }

    /// Whether the subscription is still visible in the user's history at `now`
    pub fn is_visible_at(&self, now: OffsetDateTime) -> bool {
        match self.ended_at {
            None => true,
            Some(ended_at) => ended_at > now,
        }
    }
}

/// Current subscription joined with its (required) product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionWithProduct {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub product: Product,
}

/// Historical subscription joined with its product, if the product is known
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionWithOptionalProduct {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub product: Option<Product>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
