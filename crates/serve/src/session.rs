//! Customer session cookies.
//!
//! Three cookies set and cleared together: the provider session token, the
//! customer ID, and the customer email. All are HTTP-only, secure,
//! `SameSite=Lax`, path `/`, with a shared expiry.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use time::OffsetDateTime;

pub const SESSION_COOKIE: &str = "tollgate_session";
pub const CUSTOMER_ID_COOKIE: &str = "tollgate_customer_id";
pub const CUSTOMER_EMAIL_COOKIE: &str = "tollgate_customer_email";
pub const ACCESS_COOKIE: &str = "tollgate_access";

/// The session as read from request cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub customer_id: String,
    pub email: Option<String>,
}

/// A session requires both the token and the customer ID; email is optional
/// convenience for checkout prefill.
pub fn session_from_cookies(jar: &CookieJar) -> Option<Session> {
    let token = jar.get(SESSION_COOKIE)?.value().to_string();
    let customer_id = jar.get(CUSTOMER_ID_COOKIE)?.value().to_string();
    if token.is_empty() || customer_id.is_empty() {
        return None;
    }
    Some(Session {
        token,
        customer_id,
        email: jar
            .get(CUSTOMER_EMAIL_COOKIE)
            .map(|c| c.value().to_string()),
    })
}

pub fn has_session(jar: &CookieJar) -> bool {
    session_from_cookies(jar).is_some()
}

fn base_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

fn with_expiry(mut cookie: Cookie<'static>, expires_at: Option<DateTime<Utc>>) -> Cookie<'static> {
    if let Some(expires_at) = expires_at {
        if let Ok(expires) = OffsetDateTime::from_unix_timestamp(expires_at.timestamp()) {
            cookie.set_expires(expires);
        }
    }
    cookie
}

/// Set the three session cookies together. `None` expiry produces session
/// cookies (used when a session is recovered from a redirect token whose
/// lifetime is unknown).
pub fn set_session_cookies(
    jar: CookieJar,
    token: &str,
    customer_id: &str,
    email: &str,
    expires_at: Option<DateTime<Utc>>,
) -> CookieJar {
    jar.add(with_expiry(
        base_cookie(SESSION_COOKIE, token.to_string()),
        expires_at,
    ))
    .add(with_expiry(
        base_cookie(CUSTOMER_ID_COOKIE, customer_id.to_string()),
        expires_at,
    ))
    .add(with_expiry(
        base_cookie(CUSTOMER_EMAIL_COOKIE, email.to_string()),
        expires_at,
    ))
}

/// Clear all three on sign-out.
pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    let removal = |name: &'static str| Cookie::build((name, "")).path("/").build();
    jar.remove(removal(SESSION_COOKIE))
        .remove(removal(CUSTOMER_ID_COOKIE))
        .remove(removal(CUSTOMER_EMAIL_COOKIE))
}

/// Build the access-cookie with the same attributes, expiry mirrored to the
/// payload's `exp`.
pub fn access_cookie(value: String, exp_unix: i64) -> Cookie<'static> {
    with_expiry(
        base_cookie(ACCESS_COOKIE, value),
        DateTime::<Utc>::from_timestamp(exp_unix, 0),
    )
}
