//! Copy the Polar product catalog into the billing database
//!
//! Usage: sync-products
//!
//! Reads DATABASE_URL, POLAR_ORGANIZATION_TOKEN, POLAR_WEBHOOK_SECRET and
//! POLAR_ORGANIZATION_ID from the environment (or .env).

use std::sync::Arc;

use polar_billing::{BillingService, PgStore};
use polar_billing_shared::{create_pool, run_migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    polar_billing_api::telemetry::init_tracing();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL not set"))?;

    let pool = create_pool(&database_url, 2).await?;
    run_migrations(&pool).await?;

    let billing = BillingService::from_env(Arc::new(PgStore::new(pool)))?;
    let count = billing.products.sync_products().await?;

    println!("Synced {} products", count);
    Ok(())
}
