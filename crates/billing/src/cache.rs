//! In-process product/benefit lookup cache.
//!
//! Explicitly constructed and shared by `Arc` between the synchronizer and
//! the request-time middleware — never a process-global. Read-mostly and
//! eventually consistent: a stale or missing entry only costs one extra
//! remote lookup, never a wrong authorization.

use domain::content_id::content_id_candidates;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ProductCache {
    /// Any content-ID spelling → product ID.
    products: RwLock<HashMap<String, String>>,
    /// Product ID → canonical content ID (canonical registration wins).
    contents: RwLock<HashMap<String, String>>,
    /// Canonical content ID → custom benefit ID.
    benefits: RwLock<HashMap<String, String>>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one spelling. The reverse map only takes alias entries when
    /// the product has no canonical registration yet.
    pub fn set_product_mapping(&self, content_id: &str, product_id: &str, canonical: bool) {
        let normalised = content_id.replace('\\', "/");
        self.products
            .write()
            .insert(normalised.clone(), product_id.to_string());

        let mut contents = self.contents.write();
        if canonical || !contents.contains_key(product_id) {
            contents.insert(product_id.to_string(), normalised);
        }
    }

    /// Candidate-order lookup: the canonical spelling is tried before the
    /// legacy aliases.
    pub fn product_id_for_content(&self, content_id: &str) -> Option<String> {
        let products = self.products.read();
        content_id_candidates(content_id)
            .iter()
            .find_map(|candidate| products.get(candidate).cloned())
    }

    pub fn content_id_for_product(&self, product_id: &str) -> Option<String> {
        self.contents.read().get(product_id).cloned()
    }

    /// Register a canonical ID plus every alias spelling of it (and any
    /// extra candidates observed remotely).
    pub fn cache_product_mappings(
        &self,
        canonical_id: &str,
        product_id: &str,
        additional_candidates: Vec<String>,
    ) {
        self.set_product_mapping(canonical_id, product_id, true);

        let mut candidates = content_id_candidates(canonical_id);
        for candidate in additional_candidates {
            let candidate = candidate.replace('\\', "/");
            if !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }

        for candidate in candidates {
            if candidate != canonical_id {
                self.set_product_mapping(&candidate, product_id, false);
            }
        }
    }

    pub fn set_benefit(&self, content_id: &str, benefit_id: &str) {
        self.benefits
            .write()
            .insert(content_id.to_string(), benefit_id.to_string());
    }

    pub fn benefit_for_content(&self, content_id: &str) -> Option<String> {
        self.benefits.read().get(content_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_lookup_finds_alias_registrations() {
        let cache = ProductCache::new();
        cache.cache_product_mappings("courses/git/toc", "prod_1", Vec::new());

        assert_eq!(
            cache.product_id_for_content("courses/git/toc").as_deref(),
            Some("prod_1")
        );
        // alias spellings resolve too
        assert_eq!(cache.product_id_for_content("git/toc").as_deref(), Some("prod_1"));
        assert_eq!(cache.product_id_for_content("toc").as_deref(), Some("prod_1"));
        assert_eq!(cache.product_id_for_content("other/id"), None);
    }

    #[test]
    fn canonical_reverse_mapping_wins_over_alias() {
        let cache = ProductCache::new();
        // An alias registration lands first...
        cache.set_product_mapping("toc", "prod_1", false);
        assert_eq!(cache.content_id_for_product("prod_1").as_deref(), Some("toc"));

        // ...then the canonical registration overrides it.
        cache.set_product_mapping("courses/git/toc", "prod_1", true);
        assert_eq!(
            cache.content_id_for_product("prod_1").as_deref(),
            Some("courses/git/toc")
        );

        // A later alias cannot displace the canonical entry.
        cache.set_product_mapping("legacy/spelling", "prod_1", false);
        assert_eq!(
            cache.content_id_for_product("prod_1").as_deref(),
            Some("courses/git/toc")
        );
    }

    #[test]
    fn additional_candidates_are_registered() {
        let cache = ProductCache::new();
        cache.cache_product_mappings(
            "blogs/launch",
            "prod_9",
            vec!["blogs\\launch-legacy".to_string()],
        );
        assert_eq!(
            cache.product_id_for_content("blogs/launch-legacy").as_deref(),
            Some("prod_9")
        );
    }
}
