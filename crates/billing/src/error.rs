//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Polar API error ({status}): {message}")]
    ProviderApi { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Webhook signature verification failed: {0}")]
    WebhookSignatureInvalid(String),

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Subscription required: {0}")]
    SubscriptionRequired(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // PostgreSQL unique violation
            if db_err.code().as_deref() == Some("23505") {
                return BillingError::AlreadyExists(db_err.message().to_string());
            }
        }
        BillingError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        BillingError::InvalidPayload(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
