//! Paywall resolution middleware.
//!
//! A tower `Layer`/`Service` pair wrapping the page handler. Per request:
//! filter by URL pattern, resolve the content (groups/inheritance),
//! authenticate (access-cookie fast path → session cookies → redirect-token
//! recovery), authorize against the provider, cache fresh grants back into
//! the signed cookie, and hand the downstream renderer a `PaywallState`
//! extension. Granted pages with downloads get the panel injected before
//! `</body>` on the way out.
//!
//! Paywall failures never fail the page: every step degrades to "treat as
//! unauthenticated" or "skip the optional section". The only deliberate
//! blocking behavior is the paywalled preview itself.

use crate::cookie::{
    access_cookie_entry, decode_access_cookie, encode_access_cookie, upsert_access_cookie,
};
use crate::inject::inject_before_body_close;
use crate::remote::{RemoteEntitlements, SessionInfo};
use crate::resolve::{ResolvedContent, Resolver};
use crate::session::{
    access_cookie, session_from_cookies, set_session_cookies, Session, ACCESS_COOKIE,
};
use crate::templates::{build_paywall_context, Templates};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Uri};
use axum::response::Response;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::Utc;
use domain::config::GateConfig;
use domain::pattern::{build_url_patterns, should_process_url};
use domain::paywall::PaywallState;
use domain::preview::{
    classify_content, slide_preview, truncate_html_blocks, ContentShape, PREVIEW_PARAGRAPHS,
    PREVIEW_SLIDES,
};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Replaces both the authentication and the authorization checks when the
/// host site brings its own account system.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn is_authenticated(&self, req: &Request<Body>) -> bool;
    async fn check_access(&self, req: &Request<Body>, content_id: &str) -> bool;
}

/// Everything the middleware and the API routes share.
pub struct GateContext {
    pub config: Arc<GateConfig>,
    pub resolver: Arc<Resolver>,
    pub backend: Arc<dyn RemoteEntitlements>,
    pub templates: Arc<Templates>,
    pub policy: Option<Arc<dyn AccessPolicy>>,
    url_patterns: Vec<String>,
}

impl GateContext {
    pub fn new(
        config: Arc<GateConfig>,
        resolver: Arc<Resolver>,
        backend: Arc<dyn RemoteEntitlements>,
        templates: Arc<Templates>,
        policy: Option<Arc<dyn AccessPolicy>>,
    ) -> Self {
        let url_patterns = build_url_patterns(&config.collections, config.i18n.as_ref());
        Self {
            config,
            resolver,
            backend,
            templates,
            policy,
            url_patterns,
        }
    }
}

#[derive(Clone)]
pub struct PaywallLayer {
    ctx: Arc<GateContext>,
}

impl PaywallLayer {
    pub fn new(ctx: Arc<GateContext>) -> Self {
        Self { ctx }
    }
}

impl<S> Layer<S> for PaywallLayer {
    type Service = PaywallService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PaywallService {
            inner,
            ctx: self.ctx.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PaywallService<S> {
    inner: S,
    ctx: Arc<GateContext>,
}

impl<S> Service<Request<Body>> for PaywallService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Error: Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    #[tracing::instrument(skip_all)]
    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let ctx = self.ctx.clone();

        Box::pin(async move {
            let path = req.uri().path().to_string();

            if !should_process_url(&path, &ctx.url_patterns) {
                return inner.call(req).await;
            }

            let Some(resolved) = ctx.resolver.resolve(&path) else {
                return inner.call(req).await;
            };

            // No product mapping means the catalog was never synced for
            // this item; log loudly and render unblocked rather than 500.
            let Some(product_id) = ctx
                .backend
                .product_id_for_content(&resolved.content_id)
                .await
            else {
                tracing::error!(
                    content_id = %resolved.content_id,
                    "no product found for payable content; run a sync first"
                );
                return inner.call(req).await;
            };

            let outcome = authorize(&ctx, &req, &resolved, &product_id).await;

            let mut state = PaywallState {
                is_payable: true,
                is_authenticated: outcome.is_authenticated,
                has_access: outcome.has_access,
                product_id: product_id.clone(),
                content_id: resolved.content_id.clone(),
                price: resolved.payable.as_ref().map(|p| p.price),
                currency: resolved.payable.as_ref().map(|p| p.currency.clone()),
                interval: resolved.payable.as_ref().and_then(|p| p.interval),
                title: resolved.title.clone(),
                description: resolved.description.clone(),
                preview: None,
                has_downloads: resolved.downloads > 0,
                download_count: resolved.downloads,
                downloadable_files: None,
                downloadable_section: None,
            };

            if !outcome.has_access {
                state.preview = Some(build_preview(&ctx, &resolved, outcome.is_authenticated));
            }

            let mut downloadable_section = None;
            if outcome.has_access && resolved.downloads > 0 {
                if let Some(token) = outcome.session_token.as_deref() {
                    let files = ctx
                        .backend
                        .downloadable_files(token, &resolved.content_id)
                        .await;
                    if !files.is_empty() {
                        let section = ctx.templates.render_download_panel(
                            resolved.downloadable_template.as_deref(),
                            &files,
                        );
                        state.downloadable_files = Some(files);
                        if !section.is_empty() {
                            state.downloadable_section = Some(section.clone());
                            downloadable_section = Some(section);
                        }
                    }
                }
            }

            let mut req = req;
            req.extensions_mut().insert(Arc::new(state));

            let response = inner.call(req).await?;
            let response = apply_cookies(response, outcome.response_cookies);

            match downloadable_section {
                Some(section) if is_html(&response) => {
                    Ok(inject_into_response(response, &section).await)
                }
                _ => Ok(response),
            }
        })
    }
}

struct AuthzOutcome {
    is_authenticated: bool,
    has_access: bool,
    session_token: Option<String>,
    response_cookies: Vec<Cookie<'static>>,
}

/// Steps 3–5: authenticate, authorize, cache. Strictly sequential — each
/// depends on the previous. Side effects are confined to the cookies
/// returned for the response.
async fn authorize(
    ctx: &GateContext,
    req: &Request<Body>,
    resolved: &ResolvedContent,
    product_id: &str,
) -> AuthzOutcome {
    let jar = CookieJar::from_headers(req.headers());
    let now = Utc::now().timestamp();
    let secret = &ctx.config.signing_secret;

    let decoded = decode_access_cookie(
        jar.get(ACCESS_COOKIE).map(|c| c.value()),
        secret,
        now,
    );

    // Fast path: a valid unexpired cookie entry is the authority for its
    // TTL window — no session check, no remote call.
    if access_cookie_entry(decoded.as_ref(), &resolved.content_id, now)
        .map(|entry| entry.access)
        .unwrap_or(false)
    {
        return AuthzOutcome {
            is_authenticated: true,
            has_access: true,
            session_token: session_from_cookies(&jar).map(|s| s.token),
            response_cookies: Vec::new(),
        };
    }

    let mut response_cookies = Vec::new();
    let mut session = session_from_cookies(&jar);

    // Provider checkout redirects carry a session token in the URL;
    // validate it and persist it as cookies.
    if session.is_none() {
        if let Some(token) = query_param(req.uri(), "customer_session_token") {
            if let Some(recovered) = ctx.backend.customer_from_token(&token).await {
                response_cookies.extend(session_cookie_list(&recovered));
                session = Some(Session {
                    token: recovered.token,
                    customer_id: recovered.customer_id,
                    email: Some(recovered.email),
                });
            }
        }
    }

    let (is_authenticated, has_access) = match &ctx.policy {
        Some(policy) => {
            let is_authenticated = policy.is_authenticated(req).await;
            let has_access = is_authenticated
                && policy.check_access(req, &resolved.content_id).await;
            (is_authenticated, has_access)
        }
        None => {
            let is_authenticated = session.is_some();
            let has_access = match &session {
                Some(session) => {
                    ctx.backend
                        .validate_access(&session.token, &session.customer_id, &resolved.content_id)
                        .await
                }
                None => false,
            };
            (is_authenticated, has_access)
        }
    };

    if has_access {
        let payload = upsert_access_cookie(
            decoded,
            &resolved.content_id,
            Some(product_id),
            now,
            ctx.config.access_cookie.ttl_seconds,
            ctx.config.access_cookie.max_entries,
        );
        let value = encode_access_cookie(&payload, secret);
        response_cookies.push(access_cookie(value, payload.exp));
    }

    AuthzOutcome {
        is_authenticated,
        has_access,
        session_token: session.map(|s| s.token),
        response_cookies,
    }
}

fn session_cookie_list(info: &SessionInfo) -> Vec<Cookie<'static>> {
    set_session_cookies(
        CookieJar::new(),
        &info.token,
        &info.customer_id,
        &info.email,
        info.expires_at,
    )
    .iter()
    .cloned()
    .collect()
}

/// Step 6 (denied): classifier-selected preview substituted into the
/// paywall template. Children that inherit access skip the body preview.
fn build_preview(ctx: &GateContext, resolved: &ResolvedContent, is_authenticated: bool) -> String {
    let preview_html = if resolved.inherited {
        String::new()
    } else {
        match classify_content(&resolved.body) {
            ContentShape::SlideDeck => {
                let markdown = slide_preview(&resolved.body, PREVIEW_SLIDES);
                comrak::markdown_to_html(&markdown, &comrak::Options::default())
            }
            ContentShape::Prose => {
                let html =
                    comrak::markdown_to_html(&resolved.body, &comrak::Options::default());
                truncate_html_blocks(&html, PREVIEW_PARAGRAPHS).unwrap_or_default()
            }
        }
    };

    let context = build_paywall_context(
        resolved,
        preview_html,
        is_authenticated,
        &ctx.config.signin_page_path,
    );
    ctx.templates
        .render_paywall(resolved.paywall_template.as_deref(), &context)
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn apply_cookies(mut response: Response, cookies: Vec<Cookie<'static>>) -> Response {
    for cookie in cookies {
        match cookie.to_string().parse() {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => tracing::warn!("unserializable cookie dropped: {err}"),
        }
    }
    response
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/html"))
        .unwrap_or(false)
}

/// Buffer the downstream HTML and append the download panel to `<body>`.
/// Any failure returns the page untouched (or as close as possible).
async fn inject_into_response(response: Response, section: &str) -> Response {
    let (mut parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!("failed to buffer response for injection: {err}");
            return Response::from_parts(parts, Body::empty());
        }
    };

    match inject_before_body_close(&bytes, section) {
        Ok(rewritten) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(rewritten))
        }
        Err(err) => {
            tracing::error!("download panel injection failed: {err}");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MockRemoteEntitlements;
    use crate::store::{ContentStore, Entry};
    use domain::config::{
        AccessCookieConfig, BillingConfig, BillingServer, CollectionConfig, GateConfig,
        ResolvedCollection, DEFAULT_SIGNIN_PAGE_PATH,
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn test_config() -> GateConfig {
        GateConfig {
            billing: BillingConfig {
                access_token: "tok".into(),
                organization_id: "org".into(),
                server: BillingServer::Sandbox,
                api_url: None,
            },
            site_url: "https://example.com".into(),
            content_root: "content".into(),
            collections: vec![ResolvedCollection {
                name: "blogs".into(),
                config: CollectionConfig {
                    include: "content/blogs/**/*.md".into(),
                    ..Default::default()
                },
            }],
            i18n: None,
            product_name_template: None,
            signin_page_path: DEFAULT_SIGNIN_PAGE_PATH.into(),
            signing_secret: "test-secret".into(),
            access_cookie: AccessCookieConfig::default(),
        }
    }

    fn test_store() -> ContentStore {
        let mut store = ContentStore::default();
        store.insert(
            "blogs",
            Entry {
                id: "launch.md".into(),
                slug: "launch".into(),
                front_matter: json!({ "price": 500, "title": "Launch" }),
                body: "# Heading\n\none\n\ntwo\n\nthree\n\nfour\n".into(),
            },
        );
        store
    }

    fn gate(backend: MockRemoteEntitlements) -> Arc<GateContext> {
        let config = Arc::new(test_config());
        let resolver = Arc::new(Resolver::new(config.clone(), Arc::new(test_store())));
        Arc::new(GateContext::new(
            config,
            resolver,
            Arc::new(backend),
            Arc::new(Templates::new()),
            None,
        ))
    }

    fn page_service(
    ) -> tower::util::BoxCloneService<Request<Body>, Response, std::convert::Infallible> {
        tower::util::BoxCloneService::new(tower::service_fn(|req: Request<Body>| async move {
            let state = req
                .extensions()
                .get::<Arc<PaywallState>>()
                .cloned();
            let body = match state {
                Some(state) if !state.has_access => {
                    state.preview.clone().unwrap_or_default()
                }
                _ => "<html><body><article>full content</article></body></html>".to_string(),
            };
            let response = Response::builder()
                .header(header::CONTENT_TYPE, "text/html")
                .body(Body::from(body))
                .unwrap();
            Ok::<_, std::convert::Infallible>(response)
        }))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn unmatched_urls_pass_straight_through() {
        let mut backend = MockRemoteEntitlements::new();
        backend.expect_product_id_for_content().never();
        let mut service = PaywallLayer::new(gate(backend)).layer(page_service());

        let response = service
            .ready()
            .await
            .unwrap()
            .call(Request::get("/about").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(body_string(response).await.contains("full content"));
    }

    #[tokio::test]
    async fn anonymous_visitor_gets_the_paywalled_preview() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| Some("prod_1".into()));
        backend.expect_validate_access().never();
        let mut service = PaywallLayer::new(gate(backend)).layer(page_service());

        let response = service
            .ready()
            .await
            .unwrap()
            .call(Request::get("/blogs/launch").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_string(response).await;
        assert!(body.contains("tollgate-paywall"));
        assert!(body.contains("$5.00"));
        assert!(!body.contains("full content"));
    }

    #[tokio::test]
    async fn missing_product_mapping_renders_unblocked() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| None);
        let mut service = PaywallLayer::new(gate(backend)).layer(page_service());

        let response = service
            .ready()
            .await
            .unwrap()
            .call(Request::get("/blogs/launch").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(body_string(response).await.contains("full content"));
    }

    #[tokio::test]
    async fn valid_session_grant_sets_the_access_cookie() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| Some("prod_1".into()));
        backend
            .expect_validate_access()
            .withf(|token, customer, content| {
                token == "tok" && customer == "cus_1" && content == "blogs/launch"
            })
            .returning(|_, _, _| true);
        let mut service = PaywallLayer::new(gate(backend)).layer(page_service());

        let request = Request::get("/blogs/launch")
            .header(
                header::COOKIE,
                "tollgate_session=tok; tollgate_customer_id=cus_1",
            )
            .body(Body::empty())
            .unwrap();
        let response = service.ready().await.unwrap().call(request).await.unwrap();

        let set_cookie: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(set_cookie.iter().any(|c| c.starts_with("tollgate_access=")));
        assert!(body_string(response).await.contains("full content"));
    }

    #[tokio::test]
    async fn access_cookie_fast_path_skips_the_remote_check() {
        let config = test_config();
        let now = Utc::now().timestamp();
        let payload = upsert_access_cookie(None, "blogs/launch", Some("prod_1"), now, 3600, 8);
        let cookie_value = encode_access_cookie(&payload, &config.signing_secret);

        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| Some("prod_1".into()));
        backend.expect_validate_access().never();
        let mut service = PaywallLayer::new(gate(backend)).layer(page_service());

        let request = Request::get("/blogs/launch")
            .header(header::COOKIE, format!("tollgate_access={cookie_value}"))
            .body(Body::empty())
            .unwrap();
        let response = service.ready().await.unwrap().call(request).await.unwrap();
        assert!(body_string(response).await.contains("full content"));
    }

    #[tokio::test]
    async fn tampered_access_cookie_degrades_to_unauthenticated() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| Some("prod_1".into()));
        let mut service = PaywallLayer::new(gate(backend)).layer(page_service());

        let request = Request::get("/blogs/launch")
            .header(header::COOKIE, "tollgate_access=garbage.signature")
            .body(Body::empty())
            .unwrap();
        let response = service.ready().await.unwrap().call(request).await.unwrap();
        assert!(body_string(response).await.contains("tollgate-paywall"));
    }

    #[tokio::test]
    async fn redirect_token_recovers_a_session() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| Some("prod_1".into()));
        backend
            .expect_customer_from_token()
            .withf(|token| token == "redir_tok")
            .returning(|_| {
                Some(SessionInfo {
                    token: "redir_tok".into(),
                    customer_id: "cus_9".into(),
                    email: "a@b.test".into(),
                    expires_at: None,
                })
            });
        backend
            .expect_validate_access()
            .returning(|_, _, _| true);
        let mut service = PaywallLayer::new(gate(backend)).layer(page_service());

        let request = Request::get("/blogs/launch?customer_session_token=redir_tok")
            .body(Body::empty())
            .unwrap();
        let response = service.ready().await.unwrap().call(request).await.unwrap();

        let set_cookie: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(set_cookie.iter().any(|c| c.starts_with("tollgate_session=redir_tok")));
        assert!(set_cookie.iter().any(|c| c.starts_with("tollgate_customer_id=cus_9")));
        assert!(set_cookie.iter().any(|c| c.starts_with("tollgate_access=")));
    }

    #[tokio::test]
    async fn granted_page_with_downloads_gets_the_panel_injected() {
        let mut store = test_store();
        store.insert(
            "blogs",
            Entry {
                id: "bundle.md".into(),
                slug: "bundle".into(),
                front_matter: json!({
                    "price": 900,
                    "title": "Bundle",
                    "downloads": [{ "title": "Kit", "file": "./files/kit.zip" }],
                }),
                body: "body".into(),
            },
        );
        let config = Arc::new(test_config());
        let resolver = Arc::new(Resolver::new(config.clone(), Arc::new(store)));

        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| Some("prod_2".into()));
        backend.expect_validate_access().returning(|_, _, _| true);
        backend
            .expect_downloadable_files()
            .returning(|_, _| {
                vec![domain::paywall::DownloadFile {
                    id: "f1".into(),
                    name: "kit.zip".into(),
                    size: 2048,
                    size_formatted: "2.0 KB".into(),
                    mime_type: "application/zip".into(),
                    download_url: "https://files.example.com/f1".into(),
                    is_new: false,
                    is_legacy: false,
                }]
            });

        let ctx = Arc::new(GateContext::new(
            config,
            resolver,
            Arc::new(backend),
            Arc::new(Templates::new()),
            None,
        ));
        let mut service = PaywallLayer::new(ctx).layer(page_service());

        let request = Request::get("/blogs/bundle")
            .header(
                header::COOKIE,
                "tollgate_session=tok; tollgate_customer_id=cus_1",
            )
            .body(Body::empty())
            .unwrap();
        let response = service.ready().await.unwrap().call(request).await.unwrap();
        let body = body_string(response).await;
        assert!(body.contains("full content"));
        assert!(body.contains("tollgate-downloadables-panel"));
        assert!(body.contains("kit.zip"));
    }
}
