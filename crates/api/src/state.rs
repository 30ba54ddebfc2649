//! Application state

use std::sync::Arc;

use polar_billing::BillingService;
use sqlx::PgPool;

use crate::{auth::JwtManager, config::Config};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// `None` when the billing store is not backed by Postgres; health checks
    /// then report the database as in-memory
    pub pool: Option<PgPool>,
    pub config: Config,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(pool: Option<PgPool>, config: Config, billing: BillingService) -> Self {
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        Self {
            pool,
            config,
            jwt_manager,
            billing: Arc::new(billing),
        }
    }
}
