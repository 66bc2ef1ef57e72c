//! Request-path → content resolution, including group and inherited access.
//!
//! A group collection (a course: one index entry plus chapters) exposes
//! three URL shapes that need disambiguating:
//!   - the direct index URL (`/courses/git-essentials/toc`),
//!   - the stripped index URL (`/courses/git-essentials`),
//!   - a child URL (`/courses/git-essentials/01-intro`).
//! A URL satisfying more than one shape would silently resolve to whichever
//! was checked first, so that case is detected explicitly and rejected.

use crate::store::ContentStore;
use domain::config::{GateConfig, ResolvedCollection};
use domain::content_id::index_id_candidates;
use domain::pattern::{parse_pathname, ParsedPath};
use domain::payable::Payable;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// What one matched request resolved to. `content_id` is the entitlement
/// target — for a group child or an inherit-access child that is the
/// *parent's* canonical ID, and `payable` is omitted (children are not
/// priced themselves).
#[derive(Debug, Clone)]
pub struct ResolvedContent {
    pub content_id: String,
    pub collection: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub payable: Option<Payable>,
    /// Download count declared on the entitlement target.
    pub downloads: usize,
    /// Display entry's markdown body, for preview generation.
    pub body: String,
    /// Entitlement is inherited from an ancestor; preview generation is
    /// skipped for these.
    pub inherited: bool,
    pub paywall_template: Option<String>,
    pub downloadable_template: Option<String>,
}

pub struct Resolver {
    config: Arc<GateConfig>,
    store: Arc<ContentStore>,
    /// child canonical ID → parent canonical ID; read-mostly, a stale entry
    /// only costs a re-derivation.
    group_parent_cache: RwLock<HashMap<String, String>>,
}

impl Resolver {
    pub fn new(config: Arc<GateConfig>, store: Arc<ContentStore>) -> Self {
        Self {
            config,
            store,
            group_parent_cache: RwLock::new(HashMap::new()),
        }
    }

    /// `None` means: not payable content, handle the request normally.
    #[tracing::instrument(skip(self))]
    pub fn resolve(&self, pathname: &str) -> Option<ResolvedContent> {
        let parsed = parse_pathname(pathname, self.config.i18n.as_ref())?;
        let collection = self.config.collection(&parsed.collection)?.clone();

        if let Some(group) = collection.config.group.clone() {
            return self.resolve_group(&collection, &parsed, &group.index);
        }

        if collection.config.inherit_access.is_some() {
            return self.resolve_inherited(&collection, &parsed);
        }

        self.resolve_plain(&collection, &parsed)
    }

    fn resolve_plain(
        &self,
        collection: &ResolvedCollection,
        parsed: &ParsedPath,
    ) -> Option<ResolvedContent> {
        let entry = self.store.entry_localized(
            &collection.name,
            parsed.locale_path.as_deref(),
            &parsed.slug,
        )?;
        let payable = entry.payable()?;

        Some(ResolvedContent {
            content_id: entry.canonical_id(&collection.name),
            collection: collection.name.clone(),
            title: entry.title().map(str::to_string),
            description: entry.description().map(str::to_string),
            downloads: payable.downloads.len(),
            body: entry.body.clone(),
            inherited: false,
            payable: Some(payable),
            paywall_template: collection.config.paywall_template.clone(),
            downloadable_template: collection.config.downloadable_template.clone(),
        })
    }

    fn resolve_group(
        &self,
        collection: &ResolvedCollection,
        parsed: &ParsedPath,
        index: &str,
    ) -> Option<ResolvedContent> {
        let locale = parsed.locale_path.as_deref();
        let slug = parsed.slug.as_str();

        let entry_at_slug = self.store.entry_localized(&collection.name, locale, slug);
        let index_below = index_id_candidates(locale, slug, index)
            .into_iter()
            .find_map(|candidate| self.store.entry(&collection.name, &candidate));

        let is_direct_index = entry_at_slug.is_some()
            && (slug == index || slug.ends_with(&format!("/{index}")));
        let is_stripped_index = index_below.is_some();
        let is_child = entry_at_slug.is_some() && !is_direct_index;

        // The three shapes are assumed mutually exclusive; a layout that
        // satisfies two of them is ambiguous and must not silently pick one.
        let shapes = usize::from(is_direct_index)
            + usize::from(is_stripped_index)
            + usize::from(is_child);
        if shapes > 1 {
            tracing::error!(
                collection = %collection.name,
                slug,
                "ambiguous group URL: matches more than one of index/stripped/child"
            );
            return None;
        }

        if is_direct_index || is_stripped_index {
            let entry = if is_direct_index {
                entry_at_slug?
            } else {
                index_below?
            };
            let payable = entry.payable().or_else(|| {
                tracing::warn!(
                    collection = %collection.name,
                    entry = %entry.id,
                    "group index entry has no price; treating as free"
                );
                None
            })?;

            return Some(ResolvedContent {
                content_id: entry.canonical_id(&collection.name),
                collection: collection.name.clone(),
                title: entry.title().map(str::to_string),
                description: entry.description().map(str::to_string),
                downloads: payable.downloads.len(),
                body: entry.body.clone(),
                inherited: false,
                payable: Some(payable),
                paywall_template: collection.config.paywall_template.clone(),
                downloadable_template: collection.config.downloadable_template.clone(),
            });
        }

        if !is_child {
            return None;
        }
        let child = entry_at_slug?;
        let child_id = child.canonical_id(&collection.name);

        // Child → parent index: the index entry sitting beside the child.
        let parent_id = if let Some(cached) = self.group_parent_cache.read().get(&child_id) {
            cached.clone()
        } else {
            let parent_dir = match slug.rsplit_once('/') {
                Some((dir, _)) => dir,
                None => {
                    tracing::warn!(
                        collection = %collection.name,
                        slug,
                        "group child has no parent directory; treating as free"
                    );
                    return None;
                }
            };
            let parent_entry = index_id_candidates(locale, parent_dir, index)
                .into_iter()
                .find_map(|candidate| self.store.entry(&collection.name, &candidate));

            let Some(parent_entry) = parent_entry else {
                tracing::warn!(
                    collection = %collection.name,
                    slug,
                    index,
                    "no index entry found for group child; treating as free"
                );
                return None;
            };

            let parent_id = parent_entry.canonical_id(&collection.name);
            self.group_parent_cache
                .write()
                .insert(child_id.clone(), parent_id.clone());
            parent_id
        };

        let parent_entry = self
            .store
            .entry(&collection.name, parent_id.split_once('/').map(|(_, s)| s)?)?;
        let parent_downloads = parent_entry
            .payable()
            .map(|p| p.downloads.len())
            .unwrap_or(0);

        Some(ResolvedContent {
            content_id: parent_id,
            collection: collection.name.clone(),
            title: child.title().map(str::to_string),
            description: child.description().map(str::to_string),
            payable: None,
            downloads: parent_downloads,
            body: child.body.clone(),
            inherited: true,
            paywall_template: collection.config.paywall_template.clone(),
            downloadable_template: collection.config.downloadable_template.clone(),
        })
    }

    fn resolve_inherited(
        &self,
        collection: &ResolvedCollection,
        parsed: &ParsedPath,
    ) -> Option<ResolvedContent> {
        let entry = self.store.entry_localized(
            &collection.name,
            parsed.locale_path.as_deref(),
            &parsed.slug,
        )?;
        let child_id = entry.canonical_id(&collection.name);

        let resolver = collection.config.inherit_access.as_ref()?;
        // `None` from the strategy means "this item is free".
        let parent_id = resolver.parent_content_id(&child_id)?;

        Some(ResolvedContent {
            content_id: parent_id,
            collection: collection.name.clone(),
            title: entry.title().map(str::to_string),
            description: entry.description().map(str::to_string),
            payable: None,
            downloads: 0,
            body: entry.body.clone(),
            inherited: true,
            paywall_template: collection.config.paywall_template.clone(),
            downloadable_template: collection.config.downloadable_template.clone(),
        })
    }
}
