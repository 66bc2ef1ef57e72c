//! Thin async client for the billing provider's REST API.
//!
//! Bearer-authenticated JSON requests against a configurable base URL.
//! Listing endpoints are paginated with `page`/`limit`; callers page
//! through them via [`crate::finder`]. No retries here — a failed remote
//! call surfaces to the caller, which decides whether it is fatal (sync)
//! or degradable (request time).

use crate::types::*;
use crate::{BillingError, Result};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone)]
pub struct BillingClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl BillingClient {
    pub fn new(api_url: &str, access_token: &str) -> Result<Self> {
        let base_url = Url::parse(api_url)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: access_token.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BillingError::Api { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        self.send_json(self.http.get(url)).await
    }

    async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.http.post(url).json(body)).await
    }

    async fn patch_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T> {
        self.send_json(self.http.patch(url).json(body)).await
    }

    // ── Products ────────────────────────────────────────────────────────────

    pub async fn list_products(
        &self,
        organization_id: &str,
        metadata_content_id: Option<&str>,
        page: u32,
        limit: u32,
    ) -> Result<Page<Product>> {
        let mut url = self.url("/v1/products")?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("organization_id", organization_id);
            q.append_pair("page", &page.to_string());
            q.append_pair("limit", &limit.to_string());
            if let Some(content_id) = metadata_content_id {
                q.append_pair("metadata.content_id", content_id);
            }
        }
        self.get_json(url).await
    }

    pub async fn create_product(&self, spec: &ProductCreate) -> Result<Product> {
        let url = self.url("/v1/products")?;
        self.post_json(url, spec).await
    }

    pub async fn update_product(&self, id: &str, spec: &ProductUpdate) -> Result<Product> {
        let url = self.url(&format!("/v1/products/{id}"))?;
        self.patch_json(url, spec).await
    }

    /// Replace the product's benefit set wholesale.
    pub async fn update_product_benefits(
        &self,
        id: &str,
        benefit_ids: &[String],
    ) -> Result<Product> {
        let url = self.url(&format!("/v1/products/{id}/benefits"))?;
        self.post_json(url, &serde_json::json!({ "benefits": benefit_ids }))
            .await
    }

    // ── Benefits ────────────────────────────────────────────────────────────

    pub async fn list_benefits(
        &self,
        organization_id: &str,
        metadata_content_id: Option<&str>,
        page: u32,
        limit: u32,
    ) -> Result<Page<Benefit>> {
        let mut url = self.url("/v1/benefits")?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("organization_id", organization_id);
            q.append_pair("page", &page.to_string());
            q.append_pair("limit", &limit.to_string());
            if let Some(content_id) = metadata_content_id {
                q.append_pair("metadata.content_id", content_id);
            }
        }
        self.get_json(url).await
    }

    pub async fn create_benefit(&self, spec: &BenefitCreate) -> Result<Benefit> {
        let url = self.url("/v1/benefits")?;
        self.post_json(url, spec).await
    }

    pub async fn update_benefit(&self, id: &str, spec: &BenefitUpdate) -> Result<Benefit> {
        let url = self.url(&format!("/v1/benefits/{id}"))?;
        self.patch_json(url, spec).await
    }

    /// Grants of one benefit, optionally narrowed to a customer. Used with
    /// `is_granted=true, limit=1` as the entitlement check.
    pub async fn benefit_grants(
        &self,
        benefit_id: &str,
        customer_id: &str,
        limit: u32,
    ) -> Result<Page<BenefitGrant>> {
        let mut url = self.url(&format!("/v1/benefits/{benefit_id}/grants"))?;
        url.query_pairs_mut()
            .append_pair("customer_id", customer_id)
            .append_pair("is_granted", "true")
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    // ── Customers & sessions ───────────────────────────────────────────────

    pub async fn list_customers(
        &self,
        organization_id: &str,
        email: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<Customer>> {
        let mut url = self.url("/v1/customers")?;
        url.query_pairs_mut()
            .append_pair("organization_id", organization_id)
            .append_pair("email", email)
            .append_pair("page", &page.to_string())
            .append_pair("limit", &limit.to_string());
        self.get_json(url).await
    }

    pub async fn create_customer_session(&self, customer_id: &str) -> Result<CustomerSession> {
        let url = self.url("/v1/customer-sessions")?;
        self.post_json(url, &serde_json::json!({ "customer_id": customer_id }))
            .await
    }

    /// The customer behind a portal session token. Authenticated with the
    /// token itself, not the organization access token.
    pub async fn portal_customer(&self, customer_token: &str) -> Result<Customer> {
        let url = self.url("/v1/customer-portal/customers/me")?;
        let response = self
            .http
            .get(url)
            .bearer_auth(customer_token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BillingError::Api { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Downloadables visible to a portal session, filtered by benefit.
    pub async fn portal_downloadables(
        &self,
        customer_token: &str,
        benefit_id: &str,
        limit: u32,
    ) -> Result<Page<Downloadable>> {
        let mut url = self.url("/v1/customer-portal/downloadables")?;
        url.query_pairs_mut()
            .append_pair("benefit_id", benefit_id)
            .append_pair("limit", &limit.to_string());
        let response = self
            .http
            .get(url)
            .bearer_auth(customer_token)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BillingError::Api { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Open a provider-hosted checkout for one product.
    pub async fn create_checkout(
        &self,
        product_id: &str,
        success_url: &str,
        customer_email: Option<&str>,
    ) -> Result<CheckoutSession> {
        let url = self.url("/v1/checkouts")?;
        let mut body = serde_json::json!({
            "products": [product_id],
            "success_url": success_url,
        });
        if let Some(email) = customer_email {
            body["customer_email"] = serde_json::Value::String(email.to_string());
        }
        self.post_json(url, &body).await
    }

    // ── Files ───────────────────────────────────────────────────────────────

    pub async fn create_file(&self, spec: &FileCreate) -> Result<FileCreated> {
        let url = self.url("/v1/files")?;
        self.post_json(url, spec).await
    }

    /// PUT one part to its presigned URL; returns the ETag the provider
    /// needs to complete the upload.
    pub async fn upload_part(&self, part: &PresignedPart, body: Vec<u8>) -> Result<String> {
        let mut req = self.http.put(&part.url).body(body);
        if let Some(headers) = &part.headers {
            for (name, value) in headers {
                req = req.header(name, value);
            }
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Upload { status, body });
        }

        response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string())
            .ok_or(BillingError::MissingEtag)
    }

    pub async fn complete_file_upload(
        &self,
        file_id: &str,
        completed: &FileUploadCompleted,
    ) -> Result<()> {
        let url = self.url(&format!("/v1/files/{file_id}/uploaded"))?;
        let _: serde_json::Value = self.post_json(url, completed).await?;
        Ok(())
    }
}
