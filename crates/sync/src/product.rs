//! Product/benefit synchronizer.
//!
//! Runs once per build: every payable content file converges to one remote
//! product (created or minimally updated) whose benefit set is replaced
//! with exactly the computed set — a `custom` access benefit, plus a
//! `downloadables` benefit when uploaded files are referenced. Processing
//! is sequential and fail-fast: a half-synced catalog is worse than an
//! aborted build.

use crate::files::{discover_files, parse_document};
use crate::state::{cached_file_ids, read_state_file, StateFile};
use crate::{Result, SyncError};
use billing::cache::ProductCache;
use billing::client::BillingClient;
use billing::finder::normalise_metadata_value;
use billing::ops::{find_benefit_by_content_id, find_existing_product};
use billing::types::{
    Benefit, BenefitCreate, BenefitUpdate, CustomBenefitProperties, DownloadablesProperties,
    Metadata, MetadataValue, PricePayload, Product, ProductCreate, ProductUpdate, BENEFIT_CUSTOM,
    BENEFIT_DOWNLOADABLES,
};
use chrono::{DateTime, Utc};
use domain::config::{format_product_name, GateConfig};
use domain::content_id::{content_id_candidates, path_to_content_id};
use domain::pattern::build_content_url;
use domain::payable::{Interval, Payable};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// The provider clamps benefit descriptions at this length.
pub const BENEFIT_DESCRIPTION_MAX: usize = 42;

/// Everything the remote product should look like for one content file.
#[derive(Debug, Clone)]
pub struct DesiredProduct {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub currency: String,
    pub interval: Option<Interval>,
    pub content_id: String,
    pub collection: String,
    pub updated_at: i64,
    pub content_url: String,
    pub file_ids: Vec<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOutcome {
    pub synced: usize,
}

pub struct Synchronizer<'a> {
    config: &'a GateConfig,
    client: &'a BillingClient,
    cache: Arc<ProductCache>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(config: &'a GateConfig, client: &'a BillingClient, cache: Arc<ProductCache>) -> Self {
        Self {
            config,
            client,
            cache,
        }
    }

    /// Sync all payable content, sequentially per collection pattern.
    #[tracing::instrument(skip_all)]
    pub async fn sync_products(&self, project_root: &Path) -> Result<SyncOutcome> {
        tracing::info!("syncing products");

        let state = read_state_file(project_root);
        let mut outcome = SyncOutcome::default();

        for collection in &self.config.collections {
            let pattern = &collection.config.include;
            let files = discover_files(project_root, pattern)
                .map_err(|e| e.for_pattern(pattern.clone()))?;

            if files.is_empty() {
                tracing::warn!(%pattern, "no files found for pattern");
                continue;
            }
            tracing::info!(%pattern, count = files.len(), "processing content files");

            for file_path in files {
                let synced = self
                    .process_payable_file(&file_path, &collection.name, &state, project_root)
                    .await
                    .map_err(|e| e.for_file(&file_path))?;
                if synced {
                    outcome.synced += 1;
                }
            }
        }

        tracing::info!(synced = outcome.synced, "product sync complete");
        Ok(outcome)
    }

    /// Returns `true` when the file was payable and synced, `false` when it
    /// was skipped (no price).
    async fn process_payable_file(
        &self,
        file_path: &Path,
        collection: &str,
        state: &StateFile,
        project_root: &Path,
    ) -> Result<bool> {
        let text = fs::read_to_string(file_path)?;
        let (front_matter, _body) = parse_document(&text);
        let Some(payable) = front_matter.as_ref().and_then(Payable::from_front_matter) else {
            return Ok(false);
        };

        let content_root = project_root.join(&self.config.content_root);
        let canonical_id = path_to_content_id(
            file_path,
            collection,
            &content_root,
            payable.slug.as_deref(),
        );
        let slug = canonical_id[collection.len() + 1..].to_string();

        let title = payable.title.clone().unwrap_or_else(|| slug.clone());
        let description = payable
            .description
            .clone()
            .unwrap_or_else(|| format!("Premium content: {title}"));
        let updated_at = file_mtime_unix(file_path)?;

        // Downloads resolve through the state file; a gap here is the
        // operator's cue to re-run the upload, not a reason to fail the sync.
        let mut file_ids = Vec::new();
        if !payable.downloads.is_empty() {
            let cached = cached_file_ids(state, &canonical_id);
            if cached.is_empty() {
                tracing::warn!(
                    content = %canonical_id,
                    declared = payable.downloads.len(),
                    "content declares downloads but none are uploaded; run `tollgate upload` first"
                );
            } else if cached.len() != payable.downloads.len() {
                tracing::warn!(
                    content = %canonical_id,
                    declared = payable.downloads.len(),
                    uploaded = cached.len(),
                    "download count mismatch; run `tollgate upload` to re-sync"
                );
                file_ids = cached;
            } else {
                tracing::debug!(content = %canonical_id, files = cached.len(), "using cached uploads");
                file_ids = cached;
            }
        }

        let desired = DesiredProduct {
            name: format_product_name(&title, self.config.product_name_template.as_deref()),
            description,
            price: payable.price,
            currency: payable.currency.to_lowercase(),
            interval: payable.interval,
            content_id: canonical_id.clone(),
            collection: collection.to_string(),
            updated_at,
            content_url: build_content_url(
                &self.config.site_url,
                &canonical_id,
                self.config.i18n.as_ref(),
            ),
            file_ids,
        };

        let product = self.upsert_product(&desired).await?;
        tracing::info!(
            content = %canonical_id,
            product = %product.id,
            kind = if payable.is_subscription() { "subscription" } else { "one-time" },
            "synced"
        );

        self.cache
            .cache_product_mappings(&canonical_id, &product.id, Vec::new());

        Ok(true)
    }

    /// Converge the remote product and its benefit set.
    async fn upsert_product(&self, desired: &DesiredProduct) -> Result<Product> {
        let organization_id = &self.config.billing.organization_id;
        let candidates = content_id_candidates(&desired.content_id);
        let existing = find_existing_product(self.client, organization_id, &candidates).await?;

        let metadata = desired_metadata(desired);

        let product = match existing {
            None => {
                tracing::info!(name = %desired.name, "creating product");
                self.client
                    .create_product(&ProductCreate {
                        name: desired.name.clone(),
                        description: desired.description.clone(),
                        metadata,
                        prices: vec![PricePayload::fixed(desired.price, &desired.currency)],
                        recurring_interval: desired.interval,
                    })
                    .await?
            }
            Some(existing) => {
                if existing.is_archived {
                    return Err(SyncError::ArchivedProduct {
                        name: existing.name,
                    });
                }

                // The provider refuses interval changes post-creation, so
                // surface the conflict as configuration, not as a 4xx.
                if let (Some(remote), Some(wanted)) =
                    (existing.recurring_interval, desired.interval)
                {
                    if remote != wanted {
                        return Err(SyncError::IntervalConflict {
                            name: existing.name,
                            existing: remote.to_string(),
                            requested: wanted.to_string(),
                        });
                    }
                }

                if should_update_product(&existing, desired) {
                    tracing::info!(name = %existing.name, "updating product");
                    self.client
                        .update_product(
                            &existing.id,
                            &ProductUpdate {
                                name: desired.name.clone(),
                                description: desired.description.clone(),
                                metadata,
                                prices: build_price_payload(&existing, desired),
                            },
                        )
                        .await?
                } else {
                    tracing::debug!(name = %existing.name, "no product update needed");
                    existing
                }
            }
        };

        let mut benefit_ids = vec![self.ensure_custom_benefit(desired).await?];
        if let Some(downloadables) = self.ensure_downloadables_benefit(desired).await? {
            benefit_ids.push(downloadables);
        }

        let product = self
            .client
            .update_product_benefits(&product.id, &benefit_ids)
            .await?;

        Ok(product)
    }

    /// The `custom` benefit carries the access note shown to purchasers:
    /// the description plus the content URL.
    async fn ensure_custom_benefit(&self, desired: &DesiredProduct) -> Result<String> {
        if let Some(cached) = self.cache.benefit_for_content(&desired.content_id) {
            return Ok(cached);
        }

        let organization_id = &self.config.billing.organization_id;
        let description = clamp_description(&desired.name);
        let note = format!("{}\n\n{}", desired.description, desired.content_url);

        let existing = find_benefit_by_content_id(
            self.client,
            organization_id,
            &desired.content_id,
            Some(BENEFIT_CUSTOM),
        )
        .await?;

        let benefit_id = match existing {
            Some(benefit) => {
                if benefit_note(&benefit).as_deref() != Some(note.as_str())
                    || benefit.description != description
                {
                    tracing::debug!(content = %desired.content_id, "updating custom benefit");
                    self.client
                        .update_benefit(
                            &benefit.id,
                            &BenefitUpdate {
                                description: description.clone(),
                                properties: serde_json::to_value(CustomBenefitProperties {
                                    note,
                                })?,
                            },
                        )
                        .await?
                        .id
                } else {
                    benefit.id
                }
            }
            None => {
                tracing::debug!(content = %desired.content_id, "creating custom benefit");
                self.client
                    .create_benefit(&BenefitCreate {
                        kind: BENEFIT_CUSTOM.to_string(),
                        description,
                        metadata: benefit_metadata(desired),
                        properties: serde_json::to_value(CustomBenefitProperties { note })?,
                    })
                    .await?
                    .id
            }
        };

        self.cache.set_benefit(&desired.content_id, &benefit_id);
        Ok(benefit_id)
    }

    /// A `downloadables` benefit exists only while the content references
    /// uploaded files.
    async fn ensure_downloadables_benefit(
        &self,
        desired: &DesiredProduct,
    ) -> Result<Option<String>> {
        if desired.file_ids.is_empty() {
            return Ok(None);
        }

        let organization_id = &self.config.billing.organization_id;
        let existing = find_benefit_by_content_id(
            self.client,
            organization_id,
            &desired.content_id,
            Some(BENEFIT_DOWNLOADABLES),
        )
        .await?;

        let description = clamp_description(&format!("{} files", desired.name));
        let properties = serde_json::to_value(DownloadablesProperties {
            files: desired.file_ids.clone(),
        })?;

        let benefit_id = match existing {
            Some(benefit) => {
                if benefit_files(&benefit) != desired.file_ids {
                    tracing::debug!(content = %desired.content_id, "updating downloadables benefit");
                    self.client
                        .update_benefit(
                            &benefit.id,
                            &BenefitUpdate {
                                description,
                                properties,
                            },
                        )
                        .await?
                        .id
                } else {
                    benefit.id
                }
            }
            None => {
                tracing::debug!(content = %desired.content_id, "creating downloadables benefit");
                self.client
                    .create_benefit(&BenefitCreate {
                        kind: BENEFIT_DOWNLOADABLES.to_string(),
                        description,
                        metadata: benefit_metadata(desired),
                        properties,
                    })
                    .await?
                    .id
            }
        };

        Ok(Some(benefit_id))
    }
}

fn file_mtime_unix(path: &Path) -> Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified).timestamp())
}

fn desired_metadata(desired: &DesiredProduct) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("content_id".into(), desired.content_id.as_str().into());
    metadata.insert("collection".into(), desired.collection.as_str().into());
    metadata.insert("updated_at".into(), desired.updated_at.into());
    metadata.insert(
        "pricing_model".into(),
        if desired.interval.is_some() {
            "subscription".into()
        } else {
            "one_time".into()
        },
    );
    if let Some(interval) = desired.interval {
        metadata.insert("interval".into(), interval.as_str().into());
    }
    metadata
}

fn benefit_metadata(desired: &DesiredProduct) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("content_id".into(), desired.content_id.as_str().into());
    metadata.insert("collection".into(), desired.collection.as_str().into());
    metadata.insert("title".into(), desired.name.as_str().into());
    metadata
}

/// Clamp to the provider's benefit-description limit on a char boundary.
pub fn clamp_description(text: &str) -> String {
    if text.chars().count() <= BENEFIT_DESCRIPTION_MAX {
        return text.to_string();
    }
    text.chars().take(BENEFIT_DESCRIPTION_MAX).collect()
}

fn benefit_note(benefit: &Benefit) -> Option<String> {
    benefit
        .properties
        .get("note")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn benefit_files(benefit: &Benefit) -> Vec<String> {
    benefit
        .properties
        .get("files")
        .and_then(|v| v.as_array())
        .map(|files| {
            files
                .iter()
                .filter_map(|f| f.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn needs_price_update(existing: &Product, desired: &DesiredProduct) -> bool {
    let Some(price) = existing.fixed_price() else {
        return true;
    };
    let amount_matches = price.price_amount == Some(desired.price);
    let currency_matches = price
        .price_currency
        .as_deref()
        .map(|c| c.eq_ignore_ascii_case(&desired.currency))
        .unwrap_or(false);
    !(amount_matches && currency_matches)
}

/// Does the remote product diverge from the desired state in metadata,
/// name, description, or price?
pub fn should_update_product(existing: &Product, desired: &DesiredProduct) -> bool {
    let metadata_matches = normalise_metadata_value(existing.metadata.get("content_id")).as_deref()
        == Some(desired.content_id.as_str())
        && normalise_metadata_value(existing.metadata.get("collection")).as_deref()
            == Some(desired.collection.as_str())
        && metadata_timestamp(existing.metadata.get("updated_at")) == Some(desired.updated_at);

    let name_matches = existing.name == desired.name;
    let description_matches =
        existing.description.as_deref().unwrap_or("") == desired.description;
    let price_matches = !needs_price_update(existing, desired);

    !(metadata_matches && name_matches && description_matches && price_matches)
}

fn metadata_timestamp(value: Option<&MetadataValue>) -> Option<i64> {
    match value {
        Some(MetadataValue::Number(n)) => Some(*n),
        Some(MetadataValue::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Price payload for an update: reference the existing price when nothing
/// changed, otherwise submit a new fixed price.
fn build_price_payload(existing: &Product, desired: &DesiredProduct) -> Vec<PricePayload> {
    match existing.fixed_price() {
        Some(price) if !needs_price_update(existing, desired) => {
            vec![PricePayload::Existing {
                id: price.id.clone(),
            }]
        }
        _ => vec![PricePayload::fixed(desired.price, &desired.currency)],
    }
}
