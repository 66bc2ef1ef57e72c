//! Configuration loading for the `tollgate` binary.
//!
//! A `tollgate.toml` at the project root, with secrets overridable from the
//! environment (`TOLLGATE_ACCESS_TOKEN`, `TOLLGATE_SIGNING_SECRET`).
//! Function-valued options (inherited-access strategies, auth overrides)
//! cannot live in TOML; embedders wire those in code via `GateConfig`.

use anyhow::{Context, Result};
use domain::config::{
    resolve_collections, AccessCookieConfig, BillingServer, CollectionConfig, GateConfig,
    GroupConfig, I18nConfig, DEFAULT_SIGNIN_PAGE_PATH,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ACCESS_TOKEN_ENV: &str = "TOLLGATE_ACCESS_TOKEN";
pub const SIGNING_SECRET_ENV: &str = "TOLLGATE_SIGNING_SECRET";

#[derive(Debug, Deserialize)]
struct BillingToml {
    #[serde(default)]
    access_token: Option<String>,
    organization_id: String,
    #[serde(default)]
    server: BillingServer,
    #[serde(default)]
    api_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionToml {
    include: String,
    #[serde(default)]
    paywall_template: Option<String>,
    #[serde(default)]
    downloadable_template: Option<String>,
    #[serde(default)]
    group: Option<GroupConfig>,
}

#[derive(Debug, Deserialize)]
struct ConfigToml {
    billing: BillingToml,
    site_url: String,
    #[serde(default = "default_content_root")]
    content_root: PathBuf,
    #[serde(default)]
    collections: Vec<CollectionToml>,
    #[serde(default)]
    i18n: Option<I18nConfig>,
    #[serde(default)]
    product_name_template: Option<String>,
    #[serde(default)]
    signin_page_path: Option<String>,
    #[serde(default)]
    signing_secret: Option<String>,
    #[serde(default)]
    access_cookie: Option<AccessCookieConfig>,
}

fn default_content_root() -> PathBuf {
    PathBuf::from("content")
}

/// Load and validate configuration. Missing secrets fall back to the
/// environment; a gap in either is a pre-flight failure here, not a
/// request-time surprise.
pub fn load_config(path: &Path) -> Result<GateConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let raw: ConfigToml = toml::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;

    let access_token = raw
        .billing
        .access_token
        .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
        .filter(|v| !v.trim().is_empty())
        .with_context(|| {
            format!("billing access token missing; set billing.access_token or {ACCESS_TOKEN_ENV}")
        })?;

    let signing_secret = raw
        .signing_secret
        .or_else(|| std::env::var(SIGNING_SECRET_ENV).ok())
        .unwrap_or_default();

    let collections = resolve_collections(
        raw.collections
            .into_iter()
            .map(|c| CollectionConfig {
                include: c.include,
                paywall_template: c.paywall_template,
                downloadable_template: c.downloadable_template,
                group: c.group,
                inherit_access: None,
            })
            .collect(),
    )?;

    let config = GateConfig {
        billing: domain::config::BillingConfig {
            access_token,
            organization_id: raw.billing.organization_id,
            server: raw.billing.server,
            api_url: raw.billing.api_url,
        },
        site_url: raw.site_url.trim_end_matches('/').to_string(),
        content_root: raw.content_root,
        collections,
        i18n: raw.i18n,
        product_name_template: raw.product_name_template,
        signin_page_path: raw
            .signin_page_path
            .unwrap_or_else(|| DEFAULT_SIGNIN_PAGE_PATH.to_string()),
        signing_secret,
        access_cookie: raw.access_cookie.unwrap_or_default(),
    };

    config.validate()?;
    Ok(config)
}
