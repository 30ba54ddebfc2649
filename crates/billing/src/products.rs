//! Product catalog

use polar_billing_shared::Product;

use crate::error::BillingResult;
use crate::provider::SharedProvider;
use crate::store::SharedStore;

#[derive(Clone)]
pub struct ProductService {
    provider: SharedProvider,
    store: SharedStore,
}

impl ProductService {
    pub fn new(provider: SharedProvider, store: SharedStore) -> Self {
        Self { provider, store }
    }

    pub async fn list_products(&self, include_archived: bool) -> BillingResult<Vec<Product>> {
        self.store.list_products(include_archived).await
    }

    pub async fn get_product(&self, id: &str) -> BillingResult<Option<Product>> {
        self.store.get_product(id).await
    }

    /// Copy the provider's full catalog into the store
    ///
    /// Archived products are included so that historical subscriptions keep
    /// resolving. Returns the number of products written.
    pub async fn sync_products(&self) -> BillingResult<usize> {
        let mut page = 1;
        let mut synced = 0;

        loop {
            let result = self.provider.list_products(page).await?;

            for product in &result.items {
                self.store.upsert_product(product).await?;
                synced += 1;
            }

            tracing::debug!(
                page,
                max_page = result.pagination.max_page,
                total_count = result.pagination.total_count,
                items = result.items.len(),
                "Synced product page"
            );

            if page >= result.pagination.max_page || result.items.is_empty() {
                break;
            }
            page += 1;
        }

        tracing::info!(count = synced, "Product catalog synced");
        Ok(synced)
    }
}
