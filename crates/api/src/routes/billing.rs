//! Billing routes for Polar integration

use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    Json,
};
use polar_billing::{CheckoutLink, PortalResponse};
use polar_billing_shared::{Product, SubscriptionWithOptionalProduct, SubscriptionWithProduct};
use serde::{Deserialize, Serialize};

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

/// Request to create a checkout session
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    /// Configured product key, e.g. "premium"
    pub product_key: String,
    /// Origin of the page embedding the checkout
    pub origin: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeSubscriptionRequest {
    pub product_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub revoke_immediately: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

/// Acknowledgement for a change forwarded to Polar
///
/// The stored subscription follows once the matching webhook arrives.
#[derive(Debug, Serialize)]
pub struct SubscriptionActionResponse {
    pub subscription_id: String,
    pub status: &'static str,
}

/// Create a checkout link for a product
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CheckoutLink>> {
    let link = state
        .billing
        .checkout
        .generate_checkout_link(&auth_user.user_info(), &req.product_key, &req.origin)
        .await?;

    Ok(Json(link))
}

/// Create a customer portal session, or `null` for users who never checked out
pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Option<PortalResponse>>> {
    let response = state
        .billing
        .portal
        .generate_customer_portal_url(&auth_user.user_id)
        .await?;

    Ok(Json(response))
}

pub async fn get_current_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Option<SubscriptionWithProduct>>> {
    let current = state
        .billing
        .subscriptions
        .get_current_subscription(&auth_user.user_id)
        .await?;

    Ok(Json(current))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<Vec<SubscriptionWithOptionalProduct>>> {
    let subscriptions = state
        .billing
        .subscriptions
        .list_user_subscriptions(&auth_user.user_id)
        .await?;

    Ok(Json(subscriptions))
}

pub async fn change_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<ChangeSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<SubscriptionActionResponse>)> {
    let subscription = state
        .billing
        .subscriptions
        .change_current_subscription(&auth_user.user_id, &req.product_key)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubscriptionActionResponse {
            subscription_id: subscription.id,
            status: "pending",
        }),
    ))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    body: Option<Json<CancelSubscriptionRequest>>,
) -> ApiResult<(StatusCode, Json<SubscriptionActionResponse>)> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let subscription = state
        .billing
        .subscriptions
        .cancel_current_subscription(&auth_user.user_id, req.revoke_immediately)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubscriptionActionResponse {
            subscription_id: subscription.id,
            status: "pending",
        }),
    ))
}

/// Public product catalog
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    let products = state
        .billing
        .products
        .list_products(query.include_archived)
        .await?;

    Ok(Json(products))
}
