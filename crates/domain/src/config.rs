//! Paywall configuration model.
//!
//! The host application builds a [`GateConfig`] once at startup and passes
//! it by reference into the synchronizer and the middleware. There is no
//! ambient global: anything strategy-shaped (inherited-access resolution,
//! auth overrides) is an injected trait object on the config itself.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("signing secret is not configured; set `signing_secret` or TOLLGATE_SIGNING_SECRET")]
    MissingSigningSecret,

    #[error(
        "collection name could not be inferred from include pattern `{include}`; \
         expected a `content/{{collection}}/...` path"
    )]
    UninferableCollection { include: String },
}

/// Billing provider environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BillingServer {
    #[default]
    Production,
    Sandbox,
}

impl BillingServer {
    pub fn api_url(&self) -> &'static str {
        match self {
            BillingServer::Production => "https://api.polar.sh",
            BillingServer::Sandbox => "https://sandbox-api.polar.sh",
        }
    }
}

/// Credentials and addressing for the billing provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    pub access_token: String,
    pub organization_id: String,
    #[serde(default)]
    pub server: BillingServer,
    /// Overrides the server-derived API URL (used by tests and self-hosted
    /// deployments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl BillingConfig {
    pub fn effective_api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or_else(|| self.server.api_url())
    }
}

/// Group ("course") layout: a parent index entry plus child entries that
/// inherit its entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Slug of the index entry inside the group directory, e.g. `toc`.
    pub index: String,
}

/// Maps a child content ID to the ancestor whose entitlement governs it.
/// Returning `None` declares the item free (no paywall at all).
pub trait InheritAccess: Send + Sync {
    fn parent_content_id(&self, content_id: &str) -> Option<String>;
}

impl<F> InheritAccess for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn parent_content_id(&self, content_id: &str) -> Option<String> {
        self(content_id)
    }
}

/// One gated collection of content files.
#[derive(Clone, Default)]
pub struct CollectionConfig {
    /// Project-relative include glob, e.g. `content/blogs/**/*.md`.
    pub include: String,
    /// Handlebars template overriding the built-in paywall fragment.
    pub paywall_template: Option<String>,
    /// Handlebars template overriding the built-in download panel.
    pub downloadable_template: Option<String>,
    pub group: Option<GroupConfig>,
    pub inherit_access: Option<Arc<dyn InheritAccess>>,
}

impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("include", &self.include)
            .field("group", &self.group)
            .field("inherit_access", &self.inherit_access.is_some())
            .finish()
    }
}

/// A collection with its name resolved from the include pattern.
#[derive(Debug, Clone)]
pub struct ResolvedCollection {
    pub name: String,
    pub config: CollectionConfig,
}

/// Locale routing, mirrored from the host site's i18n setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct I18nConfig {
    pub locale_paths: Vec<String>,
    pub default_locale_path: String,
    #[serde(default)]
    pub prefix_default_locale: bool,
}

/// Access-cookie tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCookieConfig {
    /// Payload lifetime in seconds.
    pub ttl_seconds: i64,
    /// Entry cap; oldest entries are evicted beyond this.
    pub max_entries: usize,
}

impl Default for AccessCookieConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 86_400,
            max_entries: 32,
        }
    }
}

pub const DEFAULT_SIGNIN_PAGE_PATH: &str = "/tollgate/signin";

/// Fully assembled gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub billing: BillingConfig,
    /// Origin the synced content URLs point at, no trailing slash.
    pub site_url: String,
    /// Directory the include patterns (and URL derivation) are rooted in.
    pub content_root: PathBuf,
    pub collections: Vec<ResolvedCollection>,
    pub i18n: Option<I18nConfig>,
    /// Optional product naming template with a `[title]` placeholder.
    pub product_name_template: Option<String>,
    pub signin_page_path: String,
    /// HMAC key for the access cookie.
    pub signing_secret: String,
    pub access_cookie: AccessCookieConfig,
}

impl GateConfig {
    /// Pre-flight validation; all failures here are fatal configuration
    /// errors, reported before any remote call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_secret.trim().is_empty() {
            return Err(ConfigError::MissingSigningSecret);
        }
        Ok(())
    }

    pub fn collection(&self, name: &str) -> Option<&ResolvedCollection> {
        self.collections.iter().find(|c| c.name == name)
    }
}

/// Infer the collection name from an include pattern: the path segment
/// after the `content` root, e.g. `content/blogs/**/*.md` → `blogs`.
pub fn infer_collection_name(include: &str) -> Option<String> {
    let cleaned = include.replace('\\', "/");
    let segments: Vec<&str> = cleaned.split('/').filter(|s| !s.is_empty()).collect();
    let content_idx = segments.iter().position(|s| *s == "content")?;
    let name = segments.get(content_idx + 1)?;
    if name.is_empty() || name.contains('*') {
        return None;
    }
    Some((*name).to_string())
}

/// Resolve raw collection configs, failing fast on an uninferable name.
pub fn resolve_collections(
    collections: Vec<CollectionConfig>,
) -> Result<Vec<ResolvedCollection>, ConfigError> {
    collections
        .into_iter()
        .map(|config| {
            let name = infer_collection_name(&config.include).ok_or_else(|| {
                ConfigError::UninferableCollection {
                    include: config.include.clone(),
                }
            })?;
            Ok(ResolvedCollection { name, config })
        })
        .collect()
}

/// Apply the optional product-name template; `[title]` is the only
/// placeholder.
pub fn format_product_name(title: &str, template: Option<&str>) -> String {
    match template {
        None => title.to_string(),
        Some(t) => t.replace("[title]", title),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_comes_from_content_segment() {
        assert_eq!(
            infer_collection_name("content/blogs/**/*.md"),
            Some("blogs".to_string())
        );
        assert_eq!(
            infer_collection_name("site/content/courses/**/*.{md,mdx}"),
            Some("courses".to_string())
        );
        assert_eq!(infer_collection_name("content/**/*.md"), None);
        assert_eq!(infer_collection_name("pages/**/*.md"), None);
    }

    #[test]
    fn resolve_fails_on_uninferable_pattern() {
        let err = resolve_collections(vec![CollectionConfig {
            include: "pages/**/*.md".into(),
            ..Default::default()
        }])
        .unwrap_err();
        assert!(matches!(err, ConfigError::UninferableCollection { .. }));
    }

    #[test]
    fn product_name_template_substitutes_title() {
        assert_eq!(format_product_name("Git Essentials", None), "Git Essentials");
        assert_eq!(
            format_product_name("Git Essentials", Some("[title] — Premium")),
            "Git Essentials — Premium"
        );
    }

    #[test]
    fn missing_signing_secret_is_fatal() {
        let config = GateConfig {
            billing: BillingConfig {
                access_token: "tok".into(),
                organization_id: "org".into(),
                server: BillingServer::Sandbox,
                api_url: None,
            },
            site_url: "https://example.com".into(),
            content_root: "content".into(),
            collections: Vec::new(),
            i18n: None,
            product_name_template: None,
            signin_page_path: DEFAULT_SIGNIN_PAGE_PATH.into(),
            signing_secret: "  ".into(),
            access_cookie: AccessCookieConfig::default(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSigningSecret)
        ));
    }
}
