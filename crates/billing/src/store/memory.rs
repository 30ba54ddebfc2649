//! In-memory billing store (for development without Postgres)

use async_trait::async_trait;
use polar_billing_shared::{
    Customer, Product, Subscription, SubscriptionWithOptionalProduct, SubscriptionWithProduct,
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::postgres::pick_current;
use super::BillingStore;
use crate::error::{BillingError, BillingResult};

#[derive(Default)]
struct Tables {
    // Vectors keep insertion order, mirroring the `seq` columns
    customers: Vec<Customer>,
    products: Vec<Product>,
    subscriptions: Vec<Subscription>,
}

impl Tables {
    fn customer_for_user(&self, user_id: &str) -> Option<&Customer> {
        self.customers.iter().find(|c| c.user_id == user_id)
    }

    fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }
}

/// Billing store held in process memory
///
/// Every operation runs under a single lock acquisition, so each call is
/// atomic with respect to concurrent callers.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.tables.read().await.subscriptions.len()
    }

    /// Number of stored customers
    pub async fn customer_count(&self) -> usize {
        self.tables.read().await.customers.len()
    }
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn get_customer_by_user_id(&self, user_id: &str) -> BillingResult<Option<Customer>> {
        Ok(self.tables.read().await.customer_for_user(user_id).cloned())
    }

    async fn insert_customer(&self, customer: &Customer) -> BillingResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .customers
            .iter()
            .any(|c| c.user_id == customer.user_id || c.id == customer.id)
        {
            return Err(BillingError::AlreadyExists(format!(
                "customer for user {}",
                customer.user_id
            )));
        }
        tables.customers.push(customer.clone());
        Ok(())
    }

    async fn upsert_customer(&self, user_id: &str, customer_id: &str) -> BillingResult<String> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.customer_for_user(user_id) {
            return Ok(existing.id.clone());
        }
        if tables.customers.iter().any(|c| c.id == customer_id) {
            return Err(BillingError::DataIntegrity(format!(
                "Customer {} is already mapped to another user",
                customer_id
            )));
        }
        tables.customers.push(Customer::new(customer_id, user_id));
        Ok(customer_id.to_string())
    }

    async fn get_subscription(&self, id: &str) -> BillingResult<Option<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables.subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn get_product(&self, id: &str) -> BillingResult<Option<Product>> {
        Ok(self.tables.read().await.product(id).cloned())
    }

    async fn get_current_subscription(
        &self,
        user_id: &str,
    ) -> BillingResult<Option<SubscriptionWithProduct>> {
        let tables = self.tables.read().await;
        let Some(customer) = tables.customer_for_user(user_id) else {
            return Ok(None);
        };

        let open: Vec<Subscription> = tables
            .subscriptions
            .iter()
            .rev()
            .filter(|s| s.customer_id == customer.id && s.ended_at.is_none())
            .cloned()
            .collect();

        let Some(subscription) = pick_current(user_id, open) else {
            return Ok(None);
        };

        let product = tables
            .product(&subscription.product_id)
            .cloned()
            .ok_or_else(|| {
                BillingError::DataIntegrity(format!(
                    "Product not found: {}",
                    subscription.product_id
                ))
            })?;

        Ok(Some(SubscriptionWithProduct {
            subscription,
            product,
        }))
    }

    async fn list_user_subscriptions(
        &self,
        user_id: &str,
        now: OffsetDateTime,
    ) -> BillingResult<Vec<SubscriptionWithOptionalProduct>> {
        let tables = self.tables.read().await;
        let Some(customer) = tables.customer_for_user(user_id) else {
            return Ok(Vec::new());
        };

        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.customer_id == customer.id && s.is_visible_at(now))
            .map(|s| SubscriptionWithOptionalProduct {
                subscription: s.clone(),
                product: tables.product(&s.product_id).cloned(),
            })
            .collect())
    }

    async fn list_products(&self, include_archived: bool) -> BillingResult<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .iter()
            .filter(|p| include_archived || !p.is_archived)
            .cloned()
            .collect())
    }

    async fn create_subscription(&self, subscription: &Subscription) -> BillingResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.subscriptions.iter().any(|s| s.id == subscription.id) {
            return Ok(false);
        }
        tables.subscriptions.push(subscription.clone());
        Ok(true)
    }

    async fn update_subscription(&self, subscription: &Subscription) -> BillingResult<()> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription.id.clone()))?;
        *existing = subscription.clone();
        Ok(())
    }

    async fn create_product(&self, product: &Product) -> BillingResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.product(&product.id).is_some() {
            return Ok(false);
        }
        tables.products.push(product.clone());
        Ok(true)
    }

    async fn update_product(&self, product: &Product) -> BillingResult<()> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .products
            .iter_mut()
            .find(|p| p.id == product.id)
            .ok_or_else(|| BillingError::ProductNotFound(product.id.clone()))?;
        *existing = product.clone();
        Ok(())
    }

    async fn upsert_product(&self, product: &Product) -> BillingResult<()> {
        let mut tables = self.tables.write().await;
        match tables.products.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product.clone(),
            None => tables.products.push(product.clone()),
        }
        Ok(())
    }

    async fn list_customer_subscriptions(
        &self,
        customer_id: &str,
    ) -> BillingResult<Vec<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{product, subscription};
    use std::sync::Arc;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_upsert_customer_twice_yields_one_row() {
        let store = MemoryStore::new();

        let first = store.upsert_customer("user_1", "cus_1").await.unwrap();
        let second = store.upsert_customer("user_1", "cus_1").await.unwrap();

        assert_eq!(first, "cus_1");
        assert_eq!(first, second);
        assert_eq!(store.customer_count().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_customer_keeps_first_mapping() {
        let store = MemoryStore::new();

        store.upsert_customer("user_1", "cus_1").await.unwrap();
        // A second remote customer created by a racing request loses
        let id = store.upsert_customer("user_1", "cus_2").await.unwrap();

        assert_eq!(id, "cus_1");
        assert_eq!(store.customer_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_converge() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = vec![];

        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.upsert_customer("user_1", &format!("cus_{}", i)).await
            }));
        }

        let mut ids = vec![];
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }

        ids.dedup();
        assert_eq!(ids.len(), 1, "All callers should see the same customer");
        assert_eq!(store.customer_count().await, 1);
    }

    #[tokio::test]
    async fn test_insert_customer_rejects_duplicate_user() {
        let store = MemoryStore::new();
        store.insert_customer(&Customer::new("cus_1", "user_1")).await.unwrap();

        let err = store
            .insert_customer(&Customer::new("cus_2", "user_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_current_subscription_none_without_customer_or_subscription() {
        let store = MemoryStore::new();
        assert!(store.get_current_subscription("user_1").await.unwrap().is_none());

        store.upsert_customer("user_1", "cus_1").await.unwrap();
        assert!(store.get_current_subscription("user_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_current_subscription_single_active() {
        let store = MemoryStore::new();
        store.upsert_customer("user_1", "cus_1").await.unwrap();
        store.create_product(&product("prod_1", false)).await.unwrap();
        store
            .create_subscription(&subscription("sub_1", "cus_1", "prod_1"))
            .await
            .unwrap();

        let current = store.get_current_subscription("user_1").await.unwrap().unwrap();
        assert_eq!(current.subscription.id, "sub_1");
        assert_eq!(current.product.id, "prod_1");
    }

    #[tokio::test]
    async fn test_current_subscription_ignores_history() {
        let store = MemoryStore::new();
        store.upsert_customer("user_1", "cus_1").await.unwrap();
        store.create_product(&product("prod_1", false)).await.unwrap();

        for i in 0..3 {
            let mut ended = subscription(&format!("sub_old_{}", i), "cus_1", "prod_1");
            ended.status = "canceled".to_string();
            ended.ended_at = Some(datetime!(2023-01-01 0:00 UTC));
            store.create_subscription(&ended).await.unwrap();
        }
        store
            .create_subscription(&subscription("sub_active", "cus_1", "prod_1"))
            .await
            .unwrap();

        let current = store.get_current_subscription("user_1").await.unwrap().unwrap();
        assert_eq!(current.subscription.id, "sub_active");
    }

    #[tokio::test]
    async fn test_current_subscription_missing_product_is_integrity_error() {
        let store = MemoryStore::new();
        store.upsert_customer("user_1", "cus_1").await.unwrap();
        store
            .create_subscription(&subscription("sub_1", "cus_1", "prod_unsynced"))
            .await
            .unwrap();

        let err = store.get_current_subscription("user_1").await.unwrap_err();
        assert!(matches!(err, BillingError::DataIntegrity(_)));
    }

    #[tokio::test]
    async fn test_list_user_subscriptions_filters_by_clock() {
        let store = MemoryStore::new();
        let now = datetime!(2024-06-01 0:00 UTC);
        store.upsert_customer("user_1", "cus_1").await.unwrap();
        store.create_product(&product("prod_1", false)).await.unwrap();

        let mut past = subscription("sub_past", "cus_1", "prod_1");
        past.ended_at = Some(datetime!(2024-05-01 0:00 UTC));
        let mut future = subscription("sub_future", "cus_1", "prod_1");
        future.ended_at = Some(datetime!(2024-07-01 0:00 UTC));
        let open = subscription("sub_open", "cus_1", "prod_missing");

        for sub in [&past, &future, &open] {
            store.create_subscription(sub).await.unwrap();
        }

        let listed = store.list_user_subscriptions("user_1", now).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.subscription.id.as_str()).collect();
        assert_eq!(ids, vec!["sub_future", "sub_open"]);

        // History tolerates a product that was never synced
        assert!(listed[0].product.is_some());
        assert!(listed[1].product.is_none());
    }

    #[tokio::test]
    async fn test_list_user_subscriptions_unknown_user_is_empty() {
        let store = MemoryStore::new();
        let listed = store
            .list_user_subscriptions("nobody", OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_list_products_archived_filter() {
        let store = MemoryStore::new();
        store.create_product(&product("prod_live", false)).await.unwrap();
        store.create_product(&product("prod_old", true)).await.unwrap();

        assert_eq!(store.list_products(false).await.unwrap().len(), 1);
        assert_eq!(store.list_products(true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_is_insert_if_absent_and_update_requires_row() {
        let store = MemoryStore::new();
        let sub = subscription("sub_1", "cus_1", "prod_1");

        assert!(store.create_subscription(&sub).await.unwrap());
        assert!(!store.create_subscription(&sub).await.unwrap());
        assert_eq!(store.subscription_count().await, 1);

        let missing = subscription("sub_2", "cus_1", "prod_1");
        let err = store.update_subscription(&missing).await.unwrap_err();
        assert!(matches!(err, BillingError::SubscriptionNotFound(_)));

        let err = store.update_product(&product("prod_x", false)).await.unwrap_err();
        assert!(matches!(err, BillingError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_product_overwrites_wholesale() {
        let store = MemoryStore::new();
        store.create_product(&product("prod_1", false)).await.unwrap();

        let mut renamed = product("prod_1", true);
        renamed.name = "Renamed".to_string();
        renamed.prices.clear();
        store.update_product(&renamed).await.unwrap();

        let stored = store.get_product("prod_1").await.unwrap().unwrap();
        assert_eq!(stored, renamed);
    }
}
