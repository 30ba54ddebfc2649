//! API routes

pub mod billing;
pub mod health;
pub mod webhook;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Polar webhook (public, uses signature verification)
    let webhook_routes =
        Router::new().route(&state.config.webhook_path, post(webhook::polar_webhook));

    // Public API routes (no auth required) - under /api/v1
    let public_api_routes = Router::new().route("/billing/products", get(billing::list_products));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/portal", post(billing::create_portal_session))
        .route("/billing/subscription", get(billing::get_current_subscription))
        .route("/billing/subscriptions", get(billing::list_subscriptions))
        .route("/billing/subscription/change", post(billing::change_subscription))
        .route("/billing/subscription/cancel", post(billing::cancel_subscription))
        .route_layer(middleware::from_fn_with_state(
            state.jwt_manager.clone(),
            require_auth,
        ));

    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .nest("/api/v1", public_api_routes.merge(protected_api_routes))
        .with_state(state)
}
