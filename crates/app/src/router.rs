//! Page rendering behind the paywall layer.
//!
//! A deliberately small downstream: content URLs render the markdown entry
//! into a plain HTML shell. When the paywall middleware attached a denied
//! `PaywallState`, the preview fragment is rendered instead of the body.
//! Anything unresolved is a plain 404.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Router};
use domain::config::GateConfig;
use domain::pattern::parse_pathname;
use domain::paywall::PaywallState;
use serve::middleware::{GateContext, PaywallLayer};
use serve::store::ContentStore;
use std::sync::Arc;
use tower::Layer;

pub struct PageState {
    pub config: Arc<GateConfig>,
    pub store: Arc<ContentStore>,
}

/// The full site router: API routes plus the fallback page renderer, all
/// wrapped in the paywall layer (which ignores API and asset paths itself).
pub fn build(ctx: Arc<GateContext>, page_state: Arc<PageState>) -> Router {
    let pages = Router::new()
        .fallback(render_page)
        .with_state(page_state);

    let routed = serve::routes::router(ctx.clone()).merge(pages);
    let layered = PaywallLayer::new(ctx).layer(routed);

    Router::new().fallback_service(layered)
}

#[tracing::instrument(skip_all)]
async fn render_page(
    State(page): State<Arc<PageState>>,
    paywall: Option<Extension<Arc<PaywallState>>>,
    uri: Uri,
) -> Response {
    let Some(parsed) = parse_pathname(uri.path(), page.config.i18n.as_ref()) else {
        return not_found();
    };
    let Some(entry) = page.store.entry_localized(
        &parsed.collection,
        parsed.locale_path.as_deref(),
        &parsed.slug,
    ) else {
        return not_found();
    };

    let title = entry.title().unwrap_or(&parsed.slug).to_string();
    let paywall = paywall.map(|Extension(state)| state);

    let body_html = match &paywall {
        Some(state) if state.is_payable && !state.has_access => {
            state.preview.clone().unwrap_or_default()
        }
        _ => comrak::markdown_to_html(&entry.body, &comrak::Options::default()),
    };

    let download_count = paywall.as_ref().map(|state| state.download_count).unwrap_or(0);
    tracing::debug!(path = %uri.path(), download_count, "rendered page");

    html_response(StatusCode::OK, &title, &body_html)
}

fn not_found() -> Response {
    html_response(StatusCode::NOT_FOUND, "Not Found", "<p>Page not found.</p>")
}

fn html_response(status: StatusCode, title: &str, body: &str) -> Response {
    let title = html_escape::encode_text(title);
    let html = format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<main>
{body}
</main>
</body>
</html>"#
    );

    (
        status,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        Body::from(html),
    )
        .into_response()
}
