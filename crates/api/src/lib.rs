#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Polar Billing API Library
//!
//! HTTP surface for the billing crate: the Polar webhook receiver, the
//! authenticated checkout/portal/subscription endpoints and health probes.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
