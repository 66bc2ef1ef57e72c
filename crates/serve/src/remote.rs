//! The remote-entitlement seam.
//!
//! The middleware and the API routes talk to the billing provider through
//! this trait so request-time logic can be tested against a mock. The real
//! implementation composes the billing client with the injected product
//! cache. Every method degrades instead of erroring: request-time provider
//! hiccups must never take a page down.

use crate::downloads;
use async_trait::async_trait;
use billing::cache::ProductCache;
use billing::client::BillingClient;
use billing::ops::{
    find_benefit_by_content_id, find_customer_by_email, find_downloadables_benefit,
    find_product_by_content_id,
};
use chrono::{DateTime, Utc};
use domain::paywall::DownloadFile;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("customer not found; purchase content first or check the email address")]
    CustomerNotFound,

    #[error("provider error: {0}")]
    Provider(String),
}

/// An established (or recovered) customer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub token: String,
    pub customer_id: String,
    pub email: String,
    /// Unknown for sessions recovered from a redirect token.
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteEntitlements: Send + Sync {
    /// Product for a content ID; `None` also covers provider failures
    /// (logged), which render the content as not payable.
    async fn product_id_for_content(&self, content_id: &str) -> Option<String>;

    /// Does this customer hold a grant for the content's benefit?
    async fn validate_access(&self, token: &str, customer_id: &str, content_id: &str) -> bool;

    /// Resolve a provider redirect token back to a customer.
    async fn customer_from_token(&self, token: &str) -> Option<SessionInfo>;

    /// Signed download URLs for a granted customer.
    async fn downloadable_files(&self, token: &str, content_id: &str) -> Vec<DownloadFile>;

    /// Email sign-in: find the customer, open a session.
    async fn create_session(&self, email: &str) -> Result<SessionInfo, SessionError>;

    /// Provider-hosted checkout URL for a product.
    async fn checkout_url(
        &self,
        product_id: &str,
        success_url: &str,
        customer_email: Option<&str>,
    ) -> Option<String>;

    /// Provider-hosted customer portal URL.
    async fn portal_url(&self, customer_id: &str) -> Option<String>;
}

pub struct BillingBackend {
    client: BillingClient,
    cache: Arc<ProductCache>,
    organization_id: String,
}

impl BillingBackend {
    pub fn new(client: BillingClient, cache: Arc<ProductCache>, organization_id: String) -> Self {
        Self {
            client,
            cache,
            organization_id,
        }
    }
}

#[async_trait]
impl RemoteEntitlements for BillingBackend {
    async fn product_id_for_content(&self, content_id: &str) -> Option<String> {
        match find_product_by_content_id(&self.client, &self.cache, &self.organization_id, content_id)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                tracing::error!(content_id, "product lookup failed: {err}");
                None
            }
        }
    }

    async fn validate_access(&self, _token: &str, customer_id: &str, content_id: &str) -> bool {
        if customer_id.is_empty() || content_id.is_empty() {
            return false;
        }

        let benefit =
            match find_benefit_by_content_id(&self.client, &self.organization_id, content_id, None)
                .await
            {
                Ok(Some(benefit)) => benefit,
                Ok(None) => {
                    tracing::warn!(
                        content_id,
                        "no benefit found for content; run a sync before serving"
                    );
                    return false;
                }
                Err(err) => {
                    tracing::error!(content_id, "benefit lookup failed: {err}");
                    return false;
                }
            };

        match self.client.benefit_grants(&benefit.id, customer_id, 1).await {
            Ok(page) => !page.items.is_empty(),
            Err(err) => {
                tracing::error!(content_id, customer_id, "grant check failed: {err}");
                false
            }
        }
    }

    async fn customer_from_token(&self, token: &str) -> Option<SessionInfo> {
        match self.client.portal_customer(token).await {
            Ok(customer) => Some(SessionInfo {
                token: token.to_string(),
                customer_id: customer.id,
                email: customer.email,
                expires_at: None,
            }),
            Err(err) => {
                tracing::warn!("session token rejected by provider: {err}");
                None
            }
        }
    }

    async fn downloadable_files(&self, token: &str, content_id: &str) -> Vec<DownloadFile> {
        if token.is_empty() {
            return Vec::new();
        }

        let benefit =
            match find_downloadables_benefit(&self.client, &self.organization_id, content_id).await
            {
                Ok(Some(benefit)) => benefit,
                Ok(None) => return Vec::new(),
                Err(err) => {
                    tracing::error!(content_id, "downloadables benefit lookup failed: {err}");
                    return Vec::new();
                }
            };

        match self
            .client
            .portal_downloadables(token, &benefit.id, 100)
            .await
        {
            Ok(page) => downloads::convert(page.items),
            Err(err) => {
                tracing::error!(content_id, "downloadables fetch failed: {err}");
                Vec::new()
            }
        }
    }

    async fn create_session(&self, email: &str) -> Result<SessionInfo, SessionError> {
        let customer = find_customer_by_email(&self.client, &self.organization_id, email)
            .await
            .map_err(|e| SessionError::Provider(e.to_string()))?
            .ok_or(SessionError::CustomerNotFound)?;

        let session = self
            .client
            .create_customer_session(&customer.id)
            .await
            .map_err(|e| SessionError::Provider(e.to_string()))?;

        Ok(SessionInfo {
            token: session.token,
            customer_id: session.customer_id,
            email: customer.email,
            expires_at: Some(session.expires_at),
        })
    }

    async fn checkout_url(
        &self,
        product_id: &str,
        success_url: &str,
        customer_email: Option<&str>,
    ) -> Option<String> {
        match self
            .client
            .create_checkout(product_id, success_url, customer_email)
            .await
        {
            Ok(checkout) => Some(checkout.url),
            Err(err) => {
                tracing::error!(product_id, "checkout creation failed: {err}");
                None
            }
        }
    }

    async fn portal_url(&self, customer_id: &str) -> Option<String> {
        match self.client.create_customer_session(customer_id).await {
            Ok(session) => session.customer_portal_url,
            Err(err) => {
                tracing::error!(customer_id, "portal session creation failed: {err}");
                None
            }
        }
    }
}
