//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use polar_billing::BillingError;
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Webhook signature rejected
    #[error("Forbidden")]
    Forbidden,

    // Validation errors
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Billing errors
    #[error("Subscription required")]
    SubscriptionRequired,

    // Internal errors
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Signature
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            // Validation
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // Billing
            ApiError::SubscriptionRequired => (StatusCode::PAYMENT_REQUIRED, "SUBSCRIPTION_REQUIRED", self.to_string()),

            // Internal
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::WebhookSignatureInvalid(_) => ApiError::Forbidden,
            BillingError::InvalidPayload(msg) | BillingError::InvalidInput(msg) => {
                ApiError::BadRequest(msg)
            }
            BillingError::SubscriptionRequired(_) => ApiError::SubscriptionRequired,
            other => {
                tracing::error!(error = %other, error_debug = ?other, "Billing operation failed");
                ApiError::Internal
            }
        }
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
