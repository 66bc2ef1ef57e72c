//! Provider-facing API routes: checkout redirect, email sign-in, sign-out,
//! and the customer-portal redirect.

use crate::middleware::GateContext;
use crate::remote::SessionError;
use crate::session::{
    clear_session_cookies, set_session_cookies, CUSTOMER_EMAIL_COOKIE, CUSTOMER_ID_COOKIE,
};
use crate::templates::{CHECKOUT_ROUTE, PORTAL_ROUTE, SIGNIN_ROUTE, SIGNOUT_ROUTE};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use domain::pattern::build_content_url;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub fn router(ctx: Arc<GateContext>) -> Router {
    Router::new()
        .route(CHECKOUT_ROUTE, get(checkout))
        .route(SIGNIN_ROUTE, post(signin))
        .route(SIGNOUT_ROUTE, post(signout))
        .route(PORTAL_ROUTE, get(portal))
        .with_state(ctx)
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `GET /api/tollgate/checkout?content=<contentId>` → 302 to the provider
/// checkout for the resolved product.
#[tracing::instrument(skip_all)]
async fn checkout(
    State(ctx): State<Arc<GateContext>>,
    Query(params): Query<HashMap<String, String>>,
    jar: CookieJar,
) -> Response {
    let Some(content_id) = params.get("content").filter(|c| !c.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "Missing content parameter");
    };

    let Some(product_id) = ctx.backend.product_id_for_content(content_id).await else {
        return json_error(StatusCode::NOT_FOUND, "Product not found for this content");
    };

    // Group index IDs end in `/{index}`; the success URL should be the
    // group root the visitor actually browses to.
    let mut url_path = content_id.clone();
    let collection_name = content_id.split('/').next().unwrap_or_default();
    if let Some(collection) = ctx.config.collection(collection_name) {
        if let Some(group) = &collection.config.group {
            let suffix = format!("/{}", group.index);
            if let Some(stripped) = url_path.strip_suffix(&suffix) {
                url_path = stripped.to_string();
            }
        }
    }

    let success_url = build_content_url(&ctx.config.site_url, &url_path, ctx.config.i18n.as_ref());
    let customer_email = jar
        .get(CUSTOMER_EMAIL_COOKIE)
        .map(|c| c.value().to_string());

    match ctx
        .backend
        .checkout_url(&product_id, &success_url, customer_email.as_deref())
        .await
    {
        Some(url) => Redirect::temporary(&url).into_response(),
        None => json_error(StatusCode::BAD_GATEWAY, "Failed to create checkout"),
    }
}

#[derive(Debug, Deserialize)]
struct SigninRequest {
    email: String,
}

/// `POST /api/tollgate/auth/signin` with `{ "email": ... }` → session
/// cookies for an existing customer.
#[tracing::instrument(skip_all)]
async fn signin(
    State(ctx): State<Arc<GateContext>>,
    jar: CookieJar,
    Json(request): Json<SigninRequest>,
) -> Response {
    let email = request.email.trim();
    if email.is_empty() || !email.contains('@') {
        return json_error(StatusCode::BAD_REQUEST, "Valid email is required");
    }

    match ctx.backend.create_session(email).await {
        Ok(session) => {
            let jar = set_session_cookies(
                jar,
                &session.token,
                &session.customer_id,
                &session.email,
                session.expires_at,
            );
            (jar, Json(json!({ "success": true }))).into_response()
        }
        Err(err) => {
            tracing::warn!("sign-in failed: {err}");
            let message = match err {
                SessionError::CustomerNotFound => err.to_string(),
                SessionError::Provider(_) => "Failed to sign in. Please try again.".to_string(),
            };
            json_error(StatusCode::UNAUTHORIZED, &message)
        }
    }
}

/// `POST /api/tollgate/auth/signout` → clears session cookies, bounces back
/// to the referring page.
#[tracing::instrument(skip_all)]
async fn signout(jar: CookieJar, headers: axum::http::HeaderMap) -> Response {
    let jar = clear_session_cookies(jar);
    let return_url = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("/")
        .to_string();
    (jar, Redirect::to(&return_url)).into_response()
}

/// `GET /api/tollgate/portal` → 302 to the provider's customer portal.
#[tracing::instrument(skip_all)]
async fn portal(State(ctx): State<Arc<GateContext>>, jar: CookieJar) -> Response {
    let Some(customer_id) = jar
        .get(CUSTOMER_ID_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
    else {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "No customer authentication found. Please sign in first.",
        );
    };

    match ctx.backend.portal_url(&customer_id).await {
        Some(url) => Redirect::temporary(&url).into_response(),
        None => json_error(StatusCode::BAD_GATEWAY, "Failed to open customer portal"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::GateContext;
    use crate::remote::{MockRemoteEntitlements, SessionInfo};
    use crate::resolve::Resolver;
    use crate::store::ContentStore;
    use crate::templates::Templates;
    use axum::body::Body;
    use axum::http::Request;
    use domain::config::{
        AccessCookieConfig, BillingConfig, BillingServer, CollectionConfig, GateConfig,
        GroupConfig, ResolvedCollection, DEFAULT_SIGNIN_PAGE_PATH,
    };
    use tower::ServiceExt;

    fn gate(backend: MockRemoteEntitlements) -> Arc<GateContext> {
        let config = Arc::new(GateConfig {
            billing: BillingConfig {
                access_token: "tok".into(),
                organization_id: "org".into(),
                server: BillingServer::Sandbox,
                api_url: None,
            },
            site_url: "https://example.com".into(),
            content_root: "content".into(),
            collections: vec![ResolvedCollection {
                name: "courses".into(),
                config: CollectionConfig {
                    include: "content/courses/**/*.md".into(),
                    group: Some(GroupConfig {
                        index: "toc".into(),
                    }),
                    ..Default::default()
                },
            }],
            i18n: None,
            product_name_template: None,
            signin_page_path: DEFAULT_SIGNIN_PAGE_PATH.into(),
            signing_secret: "secret".into(),
            access_cookie: AccessCookieConfig::default(),
        });
        let resolver = Arc::new(Resolver::new(config.clone(), Arc::new(ContentStore::default())));
        Arc::new(GateContext::new(
            config,
            resolver,
            Arc::new(backend),
            Arc::new(Templates::new()),
            None,
        ))
    }

    #[tokio::test]
    async fn checkout_requires_a_known_content_id() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| None);
        let app = router(gate(backend));

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/tollgate/checkout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::get("/api/tollgate/checkout?content=courses/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn checkout_strips_the_group_index_from_the_success_url() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_product_id_for_content()
            .returning(|_| Some("prod_1".into()));
        backend
            .expect_checkout_url()
            .withf(|product, success, email| {
                product == "prod_1"
                    && success == "https://example.com/courses/git"
                    && email.is_none()
            })
            .returning(|_, _, _| Some("https://pay.example.com/co_1".into()));
        let app = router(gate(backend));

        let response = app
            .oneshot(
                Request::get("/api/tollgate/checkout?content=courses/git/toc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://pay.example.com/co_1"
        );
    }

    #[tokio::test]
    async fn signin_sets_session_cookies() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_create_session()
            .withf(|email| email == "a@b.test")
            .returning(|_| {
                Ok(SessionInfo {
                    token: "tok".into(),
                    customer_id: "cus_1".into(),
                    email: "a@b.test".into(),
                    expires_at: None,
                })
            });
        let app = router(gate(backend));

        let response = app
            .oneshot(
                Request::post("/api/tollgate/auth/signin")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email":"a@b.test"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(cookies.iter().any(|c| c.starts_with("tollgate_session=tok")));
        assert!(cookies.iter().any(|c| c.starts_with("tollgate_customer_id=cus_1")));
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("tollgate_customer_email=a@b.test")));
    }

    #[tokio::test]
    async fn signin_rejects_bad_email_and_unknown_customers() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_create_session()
            .returning(|_| Err(SessionError::CustomerNotFound));
        let app = router(gate(backend));

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/tollgate/auth/signin")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email":"not-an-email"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::post("/api/tollgate/auth/signin")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"email":"x@y.test"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signout_clears_cookies_and_redirects_back() {
        let backend = MockRemoteEntitlements::new();
        let app = router(gate(backend));

        let response = app
            .oneshot(
                Request::post("/api/tollgate/auth/signout")
                    .header(header::REFERER, "https://example.com/blogs/launch")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://example.com/blogs/launch"
        );
        let cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(cookies.iter().any(|c| c.starts_with("tollgate_session=;")));
    }

    #[tokio::test]
    async fn portal_requires_a_session() {
        let mut backend = MockRemoteEntitlements::new();
        backend
            .expect_portal_url()
            .withf(|customer| customer == "cus_1")
            .returning(|_| Some("https://portal.example.com/p".into()));
        let app = router(gate(backend));

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/tollgate/portal")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/api/tollgate/portal")
                    .header(header::COOKIE, "tollgate_customer_id=cus_1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }
}
