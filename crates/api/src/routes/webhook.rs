//! Polar webhook endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use polar_billing::WebhookHeaders;

use crate::{error::ApiError, state::AppState};

/// Receive a Polar webhook delivery
///
/// The body is taken as raw bytes so the signature is checked against exactly
/// what was sent.
pub async fn polar_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    tracing::debug!(body_len = body.len(), "Polar webhook received");

    let webhook_headers = WebhookHeaders::from_lookup(|name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    });

    let outcome = state.billing.webhooks.handle(&body, &webhook_headers).await?;

    tracing::info!(
        webhook_id = ?webhook_headers.id,
        outcome = ?outcome,
        "Polar webhook processed"
    );

    Ok(StatusCode::ACCEPTED)
}
