#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Polar Billing Shared Types and Utilities
//!
//! Row types for the billing record store and database connection helpers
//! shared by the billing library and the API server.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
