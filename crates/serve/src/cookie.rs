//! Signed access-cookie codec.
//!
//! The cookie is a client-held cache of recent entitlement grants:
//! `base64url(JSON payload) + "." + base64url(HMAC-SHA256(payload part))`.
//! Integrity and authenticity only — the content (grant flags and product
//! IDs) is not secret, so there is no encryption. Decoding never fails
//! loudly: a tampered, expired or malformed cookie is simply "no payload",
//! which downgrades the request to the remote entitlement check.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessCookieEntry {
    pub access: bool,
    /// Unix seconds of the grant; the eviction key.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessCookiePayload {
    pub v: u8,
    pub ts: i64,
    pub exp: i64,
    pub entries: BTreeMap<String, AccessCookieEntry>,
}

fn sign(payload_part: &str, secret: &str) -> String {
    // HMAC accepts keys of any length; new_from_slice only fails for
    // unsized keys, which a &[u8] never is.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC key of any length is valid"));
    mac.update(payload_part.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

pub fn encode_access_cookie(payload: &AccessCookiePayload, secret: &str) -> String {
    // Serialization of a plain struct with string keys cannot fail.
    let json = serde_json::to_string(payload).unwrap_or_default();
    let payload_part = URL_SAFE_NO_PAD.encode(json);
    let signature = sign(&payload_part, secret);
    format!("{payload_part}.{signature}")
}

/// Decode and verify. `None` on any failure: wrong part count, signature
/// mismatch (constant-time compare), bad base64/JSON, wrong version,
/// or an `exp` in the past.
pub fn decode_access_cookie(
    value: Option<&str>,
    secret: &str,
    now: i64,
) -> Option<AccessCookiePayload> {
    let value = value?;
    let mut parts = value.split('.');
    let (payload_part, signature_part) = (parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let expected = sign(payload_part, secret);
    let given = signature_part.as_bytes();
    if given.len() != expected.as_bytes().len() {
        return None;
    }
    if given.ct_eq(expected.as_bytes()).unwrap_u8() != 1 {
        return None;
    }

    let json = URL_SAFE_NO_PAD.decode(payload_part).ok()?;
    let payload: AccessCookiePayload = serde_json::from_slice(&json).ok()?;

    if payload.v != COOKIE_VERSION || payload.exp < now {
        return None;
    }

    Some(payload)
}

/// The cached grant for one content ID, if the payload is still live.
pub fn access_cookie_entry<'a>(
    payload: Option<&'a AccessCookiePayload>,
    content_id: &str,
    now: i64,
) -> Option<&'a AccessCookieEntry> {
    let payload = payload?;
    if payload.exp < now {
        return None;
    }
    payload.entries.get(content_id)
}

/// Record a grant: clone a still-valid payload (extending its TTL) or start
/// fresh, insert the entry, then evict oldest-by-timestamp entries beyond
/// `max_entries`. Insertion is never refused — capacity is enforced purely
/// by eviction.
pub fn upsert_access_cookie(
    payload: Option<AccessCookiePayload>,
    content_id: &str,
    product_id: Option<&str>,
    now: i64,
    ttl_seconds: i64,
    max_entries: usize,
) -> AccessCookiePayload {
    let mut next = match payload {
        Some(existing) if existing.exp >= now => existing,
        _ => AccessCookiePayload {
            v: COOKIE_VERSION,
            ts: now,
            exp: now + ttl_seconds,
            entries: BTreeMap::new(),
        },
    };

    next.entries.insert(
        content_id.to_string(),
        AccessCookieEntry {
            access: true,
            ts: now,
            product_id: product_id.map(str::to_string),
        },
    );
    next.v = COOKIE_VERSION;
    next.ts = now;
    next.exp = now + ttl_seconds;

    if next.entries.len() > max_entries {
        let mut by_age: Vec<(String, i64)> = next
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.ts))
            .collect();
        by_age.sort_by_key(|(_, ts)| *ts);
        let excess = next.entries.len() - max_entries;
        for (key, _) in by_age.into_iter().take(excess) {
            next.entries.remove(&key);
        }
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-secret";
    const NOW: i64 = 1_725_000_000;

    fn payload_with(entries: &[(&str, i64)]) -> AccessCookiePayload {
        AccessCookiePayload {
            v: COOKIE_VERSION,
            ts: NOW,
            exp: NOW + 3600,
            entries: entries
                .iter()
                .map(|(id, ts)| {
                    (
                        id.to_string(),
                        AccessCookieEntry {
                            access: true,
                            ts: *ts,
                            product_id: Some("prod_1".into()),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn round_trip_reproduces_payload() {
        let payload = payload_with(&[("blogs/launch", NOW)]);
        let encoded = encode_access_cookie(&payload, SECRET);
        let decoded = decode_access_cookie(Some(&encoded), SECRET, NOW).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn expired_payload_decodes_to_none() {
        let payload = payload_with(&[("blogs/launch", NOW)]);
        let encoded = encode_access_cookie(&payload, SECRET);
        assert!(decode_access_cookie(Some(&encoded), SECRET, NOW + 3601).is_none());
    }

    #[test]
    fn tampered_payload_or_signature_decodes_to_none() {
        let payload = payload_with(&[("blogs/launch", NOW)]);
        let encoded = encode_access_cookie(&payload, SECRET);
        let (body, sig) = encoded.split_once('.').unwrap();

        // flip a byte in the payload part
        let mut body_tampered = body.to_string();
        body_tampered.replace_range(0..1, if &body[0..1] == "A" { "B" } else { "A" });
        assert!(decode_access_cookie(Some(&format!("{body_tampered}.{sig}")), SECRET, NOW).is_none());

        // flip a byte in the signature part
        let mut sig_tampered = sig.to_string();
        sig_tampered.replace_range(0..1, if &sig[0..1] == "A" { "B" } else { "A" });
        assert!(decode_access_cookie(Some(&format!("{body}.{sig_tampered}")), SECRET, NOW).is_none());

        // wrong secret
        assert!(decode_access_cookie(Some(&encoded), "other-secret", NOW).is_none());
    }

    #[test]
    fn structural_garbage_decodes_to_none() {
        assert!(decode_access_cookie(None, SECRET, NOW).is_none());
        assert!(decode_access_cookie(Some(""), SECRET, NOW).is_none());
        assert!(decode_access_cookie(Some("only-one-part"), SECRET, NOW).is_none());
        assert!(decode_access_cookie(Some("a.b.c"), SECRET, NOW).is_none());
        assert!(decode_access_cookie(Some("!!!.???"), SECRET, NOW).is_none());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let mut payload = payload_with(&[("blogs/launch", NOW)]);
        payload.v = 2;
        let encoded = encode_access_cookie(&payload, SECRET);
        assert!(decode_access_cookie(Some(&encoded), SECRET, NOW).is_none());
    }

    #[test]
    fn entry_lookup_respects_expiry() {
        let payload = payload_with(&[("blogs/launch", NOW)]);
        assert!(access_cookie_entry(Some(&payload), "blogs/launch", NOW).is_some());
        assert!(access_cookie_entry(Some(&payload), "blogs/other", NOW).is_none());
        assert!(access_cookie_entry(Some(&payload), "blogs/launch", NOW + 7200).is_none());
        assert!(access_cookie_entry(None, "blogs/launch", NOW).is_none());
    }

    #[test]
    fn upsert_extends_a_live_payload() {
        let payload = payload_with(&[("blogs/a", NOW - 100)]);
        let next = upsert_access_cookie(Some(payload), "blogs/b", Some("prod_2"), NOW, 3600, 10);
        assert_eq!(next.entries.len(), 2);
        assert_eq!(next.exp, NOW + 3600);
        assert_eq!(next.entries["blogs/b"].product_id.as_deref(), Some("prod_2"));
        // the pre-existing entry keeps its original timestamp
        assert_eq!(next.entries["blogs/a"].ts, NOW - 100);
    }

    #[test]
    fn upsert_discards_an_expired_payload() {
        let mut stale = payload_with(&[("blogs/a", NOW - 100)]);
        stale.exp = NOW - 1;
        let next = upsert_access_cookie(Some(stale), "blogs/b", None, NOW, 3600, 10);
        assert_eq!(next.entries.len(), 1);
        assert!(next.entries.contains_key("blogs/b"));
    }

    #[test]
    fn eviction_removes_oldest_first_and_never_exceeds_cap() {
        let payload = payload_with(&[("blogs/old", NOW - 500), ("blogs/mid", NOW - 200)]);
        let next = upsert_access_cookie(Some(payload), "blogs/new", None, NOW, 3600, 2);

        assert_eq!(next.entries.len(), 2);
        assert!(!next.entries.contains_key("blogs/old"));
        assert!(next.entries.contains_key("blogs/mid"));
        assert!(next.entries.contains_key("blogs/new"));
    }

    #[test]
    fn eviction_is_deterministic_for_tied_timestamps() {
        let payload = payload_with(&[("blogs/a", NOW), ("blogs/b", NOW)]);
        let first = upsert_access_cookie(Some(payload.clone()), "blogs/c", None, NOW, 3600, 2);
        let second = upsert_access_cookie(Some(payload), "blogs/c", None, NOW, 3600, 2);
        assert_eq!(first.entries, second.entries);
        assert_eq!(first.entries.len(), 2);
    }
}
