//! Wire types for the billing provider.
//!
//! Only the fields this system reads or writes are modelled; the provider's
//! richer payloads deserialize onto these with the rest ignored. The
//! free-form `metadata` map is the join key between local content and
//! remote entities (`content_id`, `collection`, `updated_at`).

use chrono::{DateTime, Utc};
use domain::payable::Interval;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Provider metadata values are strings or numbers; older sync runs wrote
/// timestamps as either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(i64),
    Bool(bool),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub max_page: u32,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub pagination: Pagination,
}

// ─────────────────────────────────────────────────────────────────────────────
// Products
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    pub amount_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_currency: Option<String>,
}

impl Price {
    pub fn is_fixed(&self) -> bool {
        self.amount_type == "fixed"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenefitSummary {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub prices: Vec<Price>,
    #[serde(default)]
    pub recurring_interval: Option<Interval>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub benefits: Vec<BenefitSummary>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Product {
    pub fn fixed_price(&self) -> Option<&Price> {
        self.prices.iter().find(|p| p.is_fixed())
    }
}

/// Price payload sent on create/update. Referencing an existing price by ID
/// keeps it; a fixed spec replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PricePayload {
    Existing { id: String },
    Fixed {
        amount_type: String,
        price_amount: i64,
        price_currency: String,
    },
}

impl PricePayload {
    pub fn fixed(amount: i64, currency: &str) -> Self {
        PricePayload::Fixed {
            amount_type: "fixed".to_string(),
            price_amount: amount,
            price_currency: currency.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductCreate {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub prices: Vec<PricePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_interval: Option<Interval>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductUpdate {
    pub name: String,
    pub description: String,
    pub metadata: Metadata,
    pub prices: Vec<PricePayload>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Benefits
// ─────────────────────────────────────────────────────────────────────────────

pub const BENEFIT_CUSTOM: &str = "custom";
pub const BENEFIT_DOWNLOADABLES: &str = "downloadables";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Benefit {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Properties of a `custom` benefit: a private note revealed to customers
/// after purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomBenefitProperties {
    pub note: String,
}

/// Properties of a `downloadables` benefit: the remote file IDs it grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadablesProperties {
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenefitCreate {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub metadata: Metadata,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenefitUpdate {
    pub description: String,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenefitGrant {
    pub id: String,
    #[serde(default)]
    pub is_granted: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Customers & sessions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerSession {
    pub token: String,
    pub customer_id: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub customer_portal_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Files & downloadables
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPartPlan {
    pub number: u32,
    pub chunk_start: u64,
    pub chunk_end: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_sha256_base64: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCreate {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub service: String,
    pub checksum_sha256_base64: String,
    pub upload: FileUploadPlan,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileUploadPlan {
    pub parts: Vec<UploadPartPlan>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresignedPart {
    pub number: u32,
    pub url: String,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub checksum_sha256_base64: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileUpload {
    pub id: String,
    pub path: String,
    pub parts: Vec<PresignedPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileCreated {
    pub id: String,
    pub upload: FileUpload,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedPart {
    pub number: u32,
    pub checksum_etag: String,
    pub checksum_sha256_base64: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileUploadCompleted {
    pub id: String,
    pub path: String,
    pub parts: Vec<UploadedPart>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadableFileInfo {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub download: DownloadLink,
    #[serde(default)]
    pub last_modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadLink {
    pub url: String,
}

/// A file the authenticated customer may download, as returned by the
/// customer portal.
#[derive(Debug, Clone, Deserialize)]
pub struct Downloadable {
    pub id: String,
    pub file: DownloadableFileInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_page_deserializes_with_unknown_fields_ignored() {
        let page: Page<Product> = serde_json::from_value(json!({
            "items": [{
                "id": "prod_1",
                "name": "Launch post",
                "description": "Premium content",
                "prices": [{
                    "id": "price_1",
                    "amount_type": "fixed",
                    "price_amount": 500,
                    "price_currency": "usd",
                    "created_at": "2025-01-01T00:00:00Z"
                }],
                "recurring_interval": "month",
                "is_archived": false,
                "benefits": [{ "id": "ben_1", "type": "custom" }],
                "metadata": { "content_id": "blogs/launch", "updated_at": 1725000000 },
                "modified_at": null
            }],
            "pagination": { "total_count": 1, "max_page": 1 }
        }))
        .unwrap();

        let product = &page.items[0];
        assert_eq!(product.fixed_price().unwrap().price_amount, Some(500));
        assert_eq!(product.recurring_interval, Some(Interval::Month));
        assert_eq!(
            product.metadata.get("content_id"),
            Some(&MetadataValue::String("blogs/launch".into()))
        );
        assert_eq!(
            product.metadata.get("updated_at"),
            Some(&MetadataValue::Number(1725000000))
        );
    }

    #[test]
    fn price_payload_serializes_both_forms() {
        let existing = serde_json::to_value(PricePayload::Existing { id: "price_1".into() }).unwrap();
        assert_eq!(existing, json!({ "id": "price_1" }));

        let fixed = serde_json::to_value(PricePayload::fixed(500, "USD")).unwrap();
        assert_eq!(
            fixed,
            json!({ "amount_type": "fixed", "price_amount": 500, "price_currency": "usd" })
        );
    }
}
