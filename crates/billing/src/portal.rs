//! Polar customer portal

use crate::customer::CustomerService;
use crate::error::BillingResult;
use crate::provider::{CustomerSession, SharedProvider};

/// Portal service for Polar customer portal sessions
#[derive(Clone)]
pub struct PortalService {
    provider: SharedProvider,
    customers: CustomerService,
}

impl PortalService {
    pub fn new(provider: SharedProvider, customers: CustomerService) -> Self {
        Self {
            provider,
            customers,
        }
    }

    /// Create a customer portal session for a customer
    pub async fn create_customer_portal_session(
        &self,
        customer_id: &str,
    ) -> BillingResult<CustomerSession> {
        let session = self.provider.create_customer_session(customer_id).await?;

        tracing::info!(customer_id = %customer_id, "Created customer portal session");

        Ok(session)
    }

    /// Portal URL for a user, or `None` when the user has never been a customer
    pub async fn generate_customer_portal_url(
        &self,
        user_id: &str,
    ) -> BillingResult<Option<PortalResponse>> {
        let Some(customer) = self.customers.get_customer_by_user_id(user_id).await? else {
            tracing::debug!(user_id = %user_id, "No customer for portal request");
            return Ok(None);
        };

        let session = self.create_customer_portal_session(&customer.id).await?;
        Ok(Some(session.into()))
    }
}

/// Response for creating a portal session
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PortalResponse {
    pub url: String,
}

impl From<CustomerSession> for PortalResponse {
    fn from(session: CustomerSession) -> Self {
        Self {
            url: session.customer_portal_url,
        }
    }
}
