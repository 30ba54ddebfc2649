//! Polar customer management

use polar_billing_shared::Customer;
use serde::Deserialize;

use crate::error::BillingResult;
use crate::provider::SharedProvider;
use crate::store::SharedStore;

/// Identity of the application user a billing operation acts for
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    pub email: String,
}

/// Customer service mapping application users to Polar customers
#[derive(Clone)]
pub struct CustomerService {
    provider: SharedProvider,
    store: SharedStore,
}

impl CustomerService {
    pub fn new(provider: SharedProvider, store: SharedStore) -> Self {
        Self { provider, store }
    }

    /// Get the stored customer for an application user
    pub async fn get_customer_by_user_id(&self, user_id: &str) -> BillingResult<Option<Customer>> {
        self.store.get_customer_by_user_id(user_id).await
    }

    /// Resolve the Polar customer ID for a user, creating the customer on first use
    ///
    /// A remote customer is only created when no local mapping exists. If a
    /// concurrent request stored a mapping first, that mapping wins and the
    /// customer created here is left unused on the Polar side.
    pub async fn get_or_create_customer_id(&self, user_id: &str, email: &str) -> BillingResult<String> {
        if let Some(customer) = self.store.get_customer_by_user_id(user_id).await? {
            return Ok(customer.id);
        }

        let created = self.provider.create_customer(email, user_id).await?;
        let customer_id = self.store.upsert_customer(user_id, &created.id).await?;

        if customer_id != created.id {
            tracing::warn!(
                user_id = %user_id,
                stored_customer_id = %customer_id,
                orphaned_customer_id = %created.id,
                "Lost customer creation race; using existing mapping"
            );
        } else {
            tracing::info!(
                user_id = %user_id,
                customer_id = %customer_id,
                "Created customer mapping"
            );
        }

        Ok(customer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BillingStore, MemoryStore};
    use crate::testing::RecordingProvider;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_existing_mapping_skips_remote_create() {
        let provider = Arc::new(RecordingProvider::default());
        let store = Arc::new(MemoryStore::new());
        store.upsert_customer("user_1", "cus_existing").await.unwrap();

        let service = CustomerService::new(provider.clone(), store.clone());
        let id = service
            .get_or_create_customer_id("user_1", "user@example.com")
            .await
            .unwrap();

        assert_eq!(id, "cus_existing");
        assert!(provider.created_customers().is_empty());
    }

    #[tokio::test]
    async fn test_first_call_creates_remote_and_local_customer() {
        let provider = Arc::new(RecordingProvider::default());
        let store = Arc::new(MemoryStore::new());

        let service = CustomerService::new(provider.clone(), store.clone());
        let id = service
            .get_or_create_customer_id("user_1", "user@example.com")
            .await
            .unwrap();

        assert_eq!(provider.created_customers(), vec!["user_1".to_string()]);
        let stored = store.get_customer_by_user_id("user_1").await.unwrap().unwrap();
        assert_eq!(stored.id, id);

        // Second call reuses the mapping
        service
            .get_or_create_customer_id("user_1", "user@example.com")
            .await
            .unwrap();
        assert_eq!(provider.created_customers().len(), 1);
    }
}
