//! Higher-level lookups composing the client, the finder and the cache.

use crate::cache::ProductCache;
use crate::client::BillingClient;
use crate::finder::{find_by_metadata_candidates, find_first_list_item, normalise_metadata_value};
use crate::types::{Benefit, Customer, Product, BENEFIT_DOWNLOADABLES};
use crate::{Result, API_PAGE_SIZE};
use domain::content_id::content_id_candidates;

/// Find a product whose `metadata.content_id` matches one of the candidate
/// spellings, canonical first.
pub async fn find_existing_product(
    client: &BillingClient,
    organization_id: &str,
    candidates: &[String],
) -> Result<Option<Product>> {
    find_by_metadata_candidates(
        candidates,
        |candidate, page| async move {
            client
                .list_products(organization_id, Some(&candidate), page, API_PAGE_SIZE)
                .await
        },
        |product: &Product| product.metadata.get("content_id"),
    )
    .await
}

/// Resolve a content ID to its product ID: cache hit short-circuits, a miss
/// searches the provider across candidates and back-fills the cache under
/// the remote item's own canonical spelling.
#[tracing::instrument(skip(client, cache))]
pub async fn find_product_by_content_id(
    client: &BillingClient,
    cache: &ProductCache,
    organization_id: &str,
    content_id: &str,
) -> Result<Option<String>> {
    if let Some(cached) = cache.product_id_for_content(content_id) {
        return Ok(Some(cached));
    }

    let candidates = content_id_candidates(content_id);
    let Some(product) = find_existing_product(client, organization_id, &candidates).await? else {
        return Ok(None);
    };

    let canonical = normalise_metadata_value(product.metadata.get("content_id"))
        .unwrap_or_else(|| content_id.to_string());
    cache.cache_product_mappings(&canonical, &product.id, candidates);

    Ok(Some(product.id))
}

/// Find the benefit joined to a content ID, optionally restricted to one
/// benefit type (e.g. `downloadables`).
pub async fn find_benefit_by_content_id(
    client: &BillingClient,
    organization_id: &str,
    content_id: &str,
    kind: Option<&str>,
) -> Result<Option<Benefit>> {
    find_first_list_item(
        |page| async move {
            client
                .list_benefits(organization_id, Some(content_id), page, API_PAGE_SIZE)
                .await
        },
        |benefit: &Benefit| {
            let id_matches = normalise_metadata_value(benefit.metadata.get("content_id"))
                .as_deref()
                == Some(content_id);
            match kind {
                Some(kind) => id_matches && benefit.kind == kind,
                None => id_matches,
            }
        },
    )
    .await
}

/// The downloadables benefit for a content ID, if any.
pub async fn find_downloadables_benefit(
    client: &BillingClient,
    organization_id: &str,
    content_id: &str,
) -> Result<Option<Benefit>> {
    find_benefit_by_content_id(client, organization_id, content_id, Some(BENEFIT_DOWNLOADABLES))
        .await
}

/// Exact-match customer lookup by normalized email.
pub async fn find_customer_by_email(
    client: &BillingClient,
    organization_id: &str,
    email: &str,
) -> Result<Option<Customer>> {
    let normalised = email.trim().to_lowercase();
    find_first_list_item(
        |page| {
            let email = normalised.clone();
            async move {
                client
                    .list_customers(organization_id, &email, page, API_PAGE_SIZE)
                    .await
            }
        },
        |customer: &Customer| customer.email.trim().to_lowercase() == normalised,
    )
    .await
}
