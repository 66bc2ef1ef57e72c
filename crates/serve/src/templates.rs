//! Paywall and download-panel fragments.
//!
//! Rendered with handlebars from built-in templates (overridable per
//! collection). Render failures degrade to an inline error fragment rather
//! than failing the request.

use crate::resolve::ResolvedContent;
use domain::paywall::DownloadFile;
use domain::payable::Interval;
use handlebars::Handlebars;
use serde::Serialize;

pub const CHECKOUT_ROUTE: &str = "/api/tollgate/checkout";
pub const SIGNIN_ROUTE: &str = "/api/tollgate/auth/signin";
pub const SIGNOUT_ROUTE: &str = "/api/tollgate/auth/signout";
pub const PORTAL_ROUTE: &str = "/api/tollgate/portal";

const FALLBACK_TITLE: &str = "Premium Content";
const FALLBACK_DESCRIPTION: &str = "This content requires payment to access.";

/// Variables available to paywall templates.
#[derive(Debug, Clone, Serialize)]
pub struct PaywallTemplateContext {
    pub content_id: String,
    pub collection: String,
    pub title: String,
    pub description: String,
    pub price: Option<i64>,
    pub formatted_price: String,
    pub currency: String,
    pub checkout_url: String,
    pub preview: String,
    pub is_authenticated: bool,
    pub signin_section: String,
    pub signin_page_path: String,
    pub is_subscription: bool,
    pub interval: Option<String>,
    pub has_downloads: bool,
    pub download_count: usize,
    pub download_info: String,
}

#[derive(Debug, Clone, Serialize)]
struct DownloadPanelContext {
    file_list: String,
}

pub struct Templates {
    handlebars: Handlebars<'static>,
}

impl Default for Templates {
    fn default() -> Self {
        Self::new()
    }
}

impl Templates {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        // fragments carry trusted HTML; escaping happens at context build
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render the paywall fragment; failures produce the error fragment.
    #[tracing::instrument(skip_all)]
    pub fn render_paywall(
        &self,
        template: Option<&str>,
        context: &PaywallTemplateContext,
    ) -> String {
        let template = template.unwrap_or(DEFAULT_PAYWALL_TEMPLATE);
        match self.handlebars.render_template(template, context) {
            Ok(html) => html,
            Err(err) => {
                tracing::error!("paywall template render failed: {err}");
                render_error_html("Preview Generation Error", &err.to_string())
            }
        }
    }

    /// Render the floating download panel; empty input renders nothing.
    #[tracing::instrument(skip_all)]
    pub fn render_download_panel(
        &self,
        template: Option<&str>,
        files: &[DownloadFile],
    ) -> String {
        if files.is_empty() {
            return String::new();
        }

        let file_list = files.iter().map(render_download_item).collect::<String>();
        let template = template.unwrap_or(DEFAULT_DOWNLOADABLE_TEMPLATE);
        match self
            .handlebars
            .render_template(template, &DownloadPanelContext { file_list })
        {
            Ok(html) => html,
            Err(err) => {
                tracing::error!("download panel render failed: {err}");
                String::new()
            }
        }
    }
}

fn render_download_item(file: &DownloadFile) -> String {
    let name = html_escape::encode_text(&file.name);
    let badge = if file.is_new {
        "<span class=\"tollgate-download-badge tollgate-download-badge-new\">New</span>"
    } else if file.is_legacy {
        "<span class=\"tollgate-download-badge\">Legacy</span>"
    } else {
        ""
    };
    format!(
        r#"<a href="{url}" class="tollgate-download-item" download="{name}">
  <div class="tollgate-download-info">
    <p class="tollgate-download-name">{name}{badge}</p>
    <p class="tollgate-download-size">{size}</p>
  </div>
</a>
"#,
        url = html_escape::encode_double_quoted_attribute(&file.download_url),
        size = html_escape::encode_text(&file.size_formatted),
    )
}

/// Consistent inline error fragment for request-time soft failures.
pub fn render_error_html(title: &str, detail: &str) -> String {
    format!(
        r#"<div class="tollgate-error" style="background: #fee; border: 2px solid #c00; padding: 1rem; border-radius: 8px; color: #c00;">
  <h3>{}</h3>
  <p>{}</p>
</div>"#,
        html_escape::encode_text(title),
        html_escape::encode_text(if detail.is_empty() {
            "An unexpected error occurred."
        } else {
            detail
        }),
    )
}

/// `$5.00`, `€9.00/month`, `1200 SEK` — best-effort currency formatting.
pub fn format_price(price: i64, currency: &str, interval: Option<Interval>) -> String {
    let amount = price as f64 / 100.0;
    let formatted = match currency.to_ascii_lowercase().as_str() {
        "usd" => format!("${amount:.2}"),
        "eur" => format!("€{amount:.2}"),
        "gbp" => format!("£{amount:.2}"),
        "jpy" => format!("¥{price}"),
        other => format!("{amount:.2} {}", other.to_uppercase()),
    };
    match interval {
        Some(interval) => format!("{formatted}/{interval}"),
        None => formatted,
    }
}

/// Assemble the template context for one denied request.
pub fn build_paywall_context(
    resolved: &ResolvedContent,
    preview: String,
    is_authenticated: bool,
    signin_page_path: &str,
) -> PaywallTemplateContext {
    let payable = resolved.payable.as_ref();
    let price = payable.map(|p| p.price);
    let currency = payable.map(|p| p.currency.clone()).unwrap_or_default();
    let interval = payable.and_then(|p| p.interval);

    let title = resolved
        .title
        .clone()
        .or_else(|| payable.and_then(|p| p.title.clone()))
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());
    let description = resolved
        .description
        .clone()
        .or_else(|| payable.and_then(|p| p.description.clone()))
        .unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string());

    let formatted_price = price
        .map(|p| format_price(p, &currency, interval))
        .unwrap_or_default();

    let checkout_url = format!(
        "{CHECKOUT_ROUTE}?content={}",
        form_urlencoded::byte_serialize(resolved.content_id.as_bytes()).collect::<String>()
    );

    let signin_section = if is_authenticated {
        String::new()
    } else {
        format!(
            r#"
  <div class="tollgate-divider">
    <span>Already purchased?</span>
  </div>
  <a href="{}" class="tollgate-signin-link">Sign in to access</a>
  "#,
            html_escape::encode_double_quoted_attribute(signin_page_path),
        )
    };

    let download_count = resolved.downloads;
    let has_downloads = download_count > 0;
    let download_info = if has_downloads {
        format!(
            r#"<div class="tollgate-downloads-info">
    <p><strong>✨ Includes {download_count} downloadable file{}</strong></p>
  </div>"#,
            if download_count > 1 { "s" } else { "" },
        )
    } else {
        String::new()
    };

    PaywallTemplateContext {
        content_id: resolved.content_id.clone(),
        collection: resolved.collection.clone(),
        title: html_escape::encode_text(&title).to_string(),
        description: html_escape::encode_text(&description).to_string(),
        price,
        formatted_price,
        currency: currency.to_uppercase(),
        checkout_url,
        preview,
        is_authenticated,
        signin_section,
        signin_page_path: signin_page_path.to_string(),
        is_subscription: interval.is_some(),
        interval: interval.map(|i| i.to_string()),
        has_downloads,
        download_count,
        download_info,
    }
}

pub const DEFAULT_PAYWALL_TEMPLATE: &str = r#"{{preview}}

<div class="tollgate-paywall">
  <h2>{{title}}</h2>
  <p>{{description}}</p>
  {{download_info}}
  {{#if formatted_price}}<div class="tollgate-price">{{formatted_price}}</div>{{/if}}
  <p>You don't have access to this content yet.</p>
  <div class="tollgate-actions">
    <a href="{{checkout_url}}" class="tollgate-checkout-btn">Purchase Access</a>
    {{signin_section}}
  </div>
</div>

<style>
  .tollgate-paywall {
    background: #f5f6ff;
    border-radius: 16px;
    padding: 2rem;
    margin: 2rem 0;
    text-align: center;
  }
  .tollgate-paywall h2 {
    font-size: 1.8rem;
    margin-bottom: 1rem;
    color: #1f2933;
  }
  .tollgate-paywall p {
    margin-bottom: 1.5rem;
    color: #475467;
    line-height: 1.6;
  }
  .tollgate-price {
    font-size: 2.5rem;
    font-weight: 700;
    margin-bottom: 1.5rem;
    color: #1f2933;
  }
  .tollgate-actions {
    display: flex;
    flex-direction: column;
    gap: 1rem;
    align-items: center;
  }
  .tollgate-checkout-btn {
    display: inline-block;
    padding: 0.85rem 2rem;
    border-radius: 999px;
    background: #1f2933;
    color: #fff;
    font-weight: 600;
    text-decoration: none;
  }
  .tollgate-divider {
    display: flex;
    align-items: center;
    width: 100%;
    margin: 0.5rem 0;
  }
  .tollgate-divider::before,
  .tollgate-divider::after {
    content: "";
    flex: 1;
    border-bottom: 1px solid #d1d5db;
  }
  .tollgate-divider span {
    padding: 0 1rem;
    color: #6b7280;
    font-size: 0.875rem;
  }
  .tollgate-signin-link {
    color: #667eea;
    text-decoration: none;
    font-weight: 500;
    font-size: 0.9rem;
  }
  .tollgate-downloads-info {
    background: #e0e7ff;
    border-radius: 8px;
    padding: 0.75rem 1rem;
    margin-bottom: 1rem;
  }
  .tollgate-downloads-info p {
    margin: 0;
    color: #3730a3;
    font-size: 0.95rem;
  }
</style>"#;

pub const DEFAULT_DOWNLOADABLE_TEMPLATE: &str = r#"<div class="tollgate-downloadables-panel">
  <div class="tollgate-downloadables-header">
    <h3>Downloadable Files</h3>
    <button class="tollgate-downloadables-close" aria-label="Close" onclick="this.closest('.tollgate-downloadables-panel').style.display='none'">×</button>
  </div>
  <div class="tollgate-downloadables-body">
    {{file_list}}
  </div>
</div>

<style>
.tollgate-downloadables-panel {
  position: fixed;
  bottom: 20px;
  right: 20px;
  width: 320px;
  max-width: calc(100vw - 40px);
  background: white;
  border-radius: 12px;
  box-shadow: 0 4px 24px rgba(0, 0, 0, 0.15);
  z-index: 1000;
  font-family: system-ui, -apple-system, sans-serif;
}
.tollgate-downloadables-header {
  display: flex;
  justify-content: space-between;
  align-items: center;
  padding: 16px 20px;
  border-bottom: 1px solid #e5e7eb;
}
.tollgate-downloadables-header h3 {
  margin: 0;
  font-size: 16px;
  font-weight: 600;
  color: #111827;
}
.tollgate-downloadables-close {
  background: none;
  border: none;
  font-size: 24px;
  color: #6b7280;
  cursor: pointer;
}
.tollgate-downloadables-body {
  padding: 12px;
  max-height: 400px;
  overflow-y: auto;
}
.tollgate-download-item {
  display: block;
  padding: 12px;
  border-radius: 8px;
  border: 1px solid #e5e7eb;
  margin-bottom: 8px;
  text-decoration: none;
}
.tollgate-download-name {
  font-size: 14px;
  font-weight: 500;
  color: #111827;
  margin: 0 0 4px 0;
}
.tollgate-download-size {
  font-size: 12px;
  color: #6b7280;
  margin: 0;
}
.tollgate-download-badge {
  margin-left: 6px;
  padding: 1px 6px;
  border-radius: 6px;
  font-size: 11px;
  background: #e5e7eb;
  color: #374151;
}
.tollgate-download-badge-new {
  background: #dbeafe;
  color: #1d4ed8;
}
</style>"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(payable: Option<domain::payable::Payable>) -> ResolvedContent {
        ResolvedContent {
            content_id: "blogs/launch".into(),
            collection: "blogs".into(),
            title: Some("Launch".into()),
            description: Some("The launch post".into()),
            downloads: payable.as_ref().map(|p| p.downloads.len()).unwrap_or(0),
            payable,
            body: String::new(),
            inherited: false,
            paywall_template: None,
            downloadable_template: None,
        }
    }

    fn payable(interval: Option<Interval>) -> domain::payable::Payable {
        serde_json::from_value(serde_json::json!({
            "price": 500,
            "currency": "usd",
            "interval": interval.map(|i| i.to_string()),
        }))
        .unwrap()
    }

    #[test]
    fn price_formatting_covers_known_and_unknown_currencies() {
        assert_eq!(format_price(500, "usd", None), "$5.00");
        assert_eq!(format_price(900, "eur", Some(Interval::Month)), "€9.00/month");
        assert_eq!(format_price(120_000, "sek", None), "1200.00 SEK");
        assert_eq!(format_price(500, "JPY", None), "¥500");
    }

    #[test]
    fn default_template_renders_with_price_and_checkout_link() {
        let templates = Templates::new();
        let ctx = build_paywall_context(
            &resolved(Some(payable(None))),
            "<p>preview</p>".into(),
            false,
            "/tollgate/signin",
        );
        let html = templates.render_paywall(None, &ctx);

        assert!(html.starts_with("<p>preview</p>"));
        assert!(html.contains("$5.00"));
        assert!(html.contains("/api/tollgate/checkout?content=blogs%2Flaunch"));
        assert!(html.contains("Sign in to access"));
    }

    #[test]
    fn inherited_children_render_without_a_price() {
        let templates = Templates::new();
        let ctx = build_paywall_context(&resolved(None), String::new(), true, "/signin");
        assert_eq!(ctx.formatted_price, "");
        assert!(!ctx.is_subscription);
        // authenticated users see no sign-in section
        assert_eq!(ctx.signin_section, "");

        let html = templates.render_paywall(None, &ctx);
        assert!(!html.contains("tollgate-price"));
        assert!(html.contains("Purchase Access"));
    }

    #[test]
    fn titles_are_escaped_into_the_context() {
        let mut r = resolved(Some(payable(None)));
        r.title = Some("<script>alert(1)</script>".into());
        let ctx = build_paywall_context(&r, String::new(), false, "/signin");
        assert!(!ctx.title.contains('<'));
    }

    #[test]
    fn broken_custom_template_degrades_to_error_fragment() {
        let templates = Templates::new();
        let ctx = build_paywall_context(
            &resolved(Some(payable(None))),
            String::new(),
            false,
            "/signin",
        );
        let html = templates.render_paywall(Some("{{#if}}broken"), &ctx);
        assert!(html.contains("tollgate-error"));
    }

    #[test]
    fn download_panel_lists_files_and_badges() {
        let templates = Templates::new();
        let files = vec![DownloadFile {
            id: "f1".into(),
            name: "kit.zip".into(),
            size: 2048,
            size_formatted: "2.0 KB".into(),
            mime_type: "application/zip".into(),
            download_url: "https://files.example.com/f1".into(),
            is_new: true,
            is_legacy: false,
        }];
        let html = templates.render_download_panel(None, &files);
        assert!(html.contains("kit.zip"));
        assert!(html.contains("2.0 KB"));
        assert!(html.contains("tollgate-download-badge-new"));

        assert_eq!(templates.render_download_panel(None, &[]), "");
    }

    #[test]
    fn subscription_context_carries_billing_cycle() {
        let ctx = build_paywall_context(
            &resolved(Some(payable(Some(Interval::Month)))),
            String::new(),
            false,
            "/signin",
        );
        assert!(ctx.is_subscription);
        assert_eq!(ctx.interval.as_deref(), Some("month"));
        assert_eq!(ctx.formatted_price, "$5.00/month");
    }
}
