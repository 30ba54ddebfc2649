//! User-facing subscription queries and changes

use polar_billing_shared::{Subscription, SubscriptionWithOptionalProduct, SubscriptionWithProduct};
use time::OffsetDateTime;

use crate::client::PolarConfig;
use crate::error::{BillingError, BillingResult};
use crate::provider::SharedProvider;
use crate::store::SharedStore;

#[derive(Clone)]
pub struct SubscriptionService {
    provider: SharedProvider,
    store: SharedStore,
    config: PolarConfig,
}

impl SubscriptionService {
    pub fn new(provider: SharedProvider, store: SharedStore, config: PolarConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    /// The user's open subscription with its product
    pub async fn get_current_subscription(
        &self,
        user_id: &str,
    ) -> BillingResult<Option<SubscriptionWithProduct>> {
        self.store.get_current_subscription(user_id).await
    }

    /// Subscriptions not yet ended, evaluated against the current time
    pub async fn list_user_subscriptions(
        &self,
        user_id: &str,
    ) -> BillingResult<Vec<SubscriptionWithOptionalProduct>> {
        self.store
            .list_user_subscriptions(user_id, OffsetDateTime::now_utc())
            .await
    }

    pub async fn get_subscription(&self, id: &str) -> BillingResult<Option<Subscription>> {
        self.store.get_subscription(id).await
    }

    /// Move the user's current subscription to the product behind `product_key`
    ///
    /// The local row changes when the provider sends `subscription.updated`.
    pub async fn change_current_subscription(
        &self,
        user_id: &str,
        product_key: &str,
    ) -> BillingResult<Subscription> {
        let product_id = self
            .config
            .product_id_for_key(product_key)
            .ok_or_else(|| BillingError::InvalidInput(format!("Unknown product key: {}", product_key)))?
            .to_string();

        let current = self.require_current(user_id).await?;

        if current.product_id == product_id {
            return Err(BillingError::InvalidInput(format!(
                "Already subscribed to {}",
                product_key
            )));
        }

        self.provider
            .update_subscription_product(&current.id, &product_id)
            .await?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %current.id,
            from_product = %current.product_id,
            to_product = %product_id,
            "Requested subscription product change"
        );

        Ok(current)
    }

    /// Cancel the user's current subscription, now or at period end
    pub async fn cancel_current_subscription(
        &self,
        user_id: &str,
        revoke_immediately: bool,
    ) -> BillingResult<Subscription> {
        let current = self.require_current(user_id).await?;

        if revoke_immediately {
            self.provider.revoke_subscription(&current.id).await?;
        } else {
            self.provider
                .cancel_subscription_at_period_end(&current.id)
                .await?;
        }

        tracing::info!(
            user_id = %user_id,
            subscription_id = %current.id,
            revoke_immediately,
            "Requested subscription cancellation"
        );

        Ok(current)
    }

    async fn require_current(&self, user_id: &str) -> BillingResult<Subscription> {
        self.store
            .get_current_subscription(user_id)
            .await?
            .map(|current| current.subscription)
            .ok_or_else(|| {
                BillingError::SubscriptionRequired(format!("User {} has no active subscription", user_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BillingStore, MemoryStore};
    use crate::testing::{product, subscription, test_config, RecordingProvider};
    use std::sync::Arc;

    async fn setup() -> (Arc<RecordingProvider>, Arc<MemoryStore>, SubscriptionService) {
        let provider = Arc::new(RecordingProvider::default());
        let store = Arc::new(MemoryStore::new());
        let service = SubscriptionService::new(provider.clone(), store.clone(), test_config());
        (provider, store, service)
    }

    async fn seed_active(store: &MemoryStore) {
        store.upsert_customer("user_1", "cus_1").await.unwrap();
        store.create_product(&product("prod_basic", false)).await.unwrap();
        store
            .create_subscription(&subscription("sub_1", "cus_1", "prod_basic"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_change_calls_provider_with_mapped_product() {
        let (provider, store, service) = setup().await;
        seed_active(&store).await;

        let sub = service
            .change_current_subscription("user_1", "premium")
            .await
            .unwrap();

        assert_eq!(sub.id, "sub_1");
        assert_eq!(
            provider.product_updates(),
            vec![("sub_1".to_string(), "prod_premium".to_string())]
        );
        // Local row waits for the webhook
        let stored = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert_eq!(stored.product_id, "prod_basic");
    }

    #[tokio::test]
    async fn test_change_to_same_product_is_rejected() {
        let (provider, store, service) = setup().await;
        seed_active(&store).await;

        let err = service
            .change_current_subscription("user_1", "basic")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::InvalidInput(_)));
        assert!(provider.product_updates().is_empty());
    }

    #[tokio::test]
    async fn test_change_without_subscription_requires_one() {
        let (_, _, service) = setup().await;

        let err = service
            .change_current_subscription("user_1", "premium")
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::SubscriptionRequired(_)));
    }

    #[tokio::test]
    async fn test_cancel_at_period_end_vs_revoke() {
        let (provider, store, service) = setup().await;
        seed_active(&store).await;

        service.cancel_current_subscription("user_1", false).await.unwrap();
        assert_eq!(provider.cancels(), vec!["sub_1".to_string()]);
        assert!(provider.revoked().is_empty());

        service.cancel_current_subscription("user_1", true).await.unwrap();
        assert_eq!(provider.revoked(), vec!["sub_1".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_without_subscription_requires_one() {
        let (provider, _, service) = setup().await;

        let err = service
            .cancel_current_subscription("user_1", true)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::SubscriptionRequired(_)));
        assert!(provider.revoked().is_empty());
    }
}
