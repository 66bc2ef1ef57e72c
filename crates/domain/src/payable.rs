//! Payable front-matter schema.
//!
//! Content is payable when its front matter carries a positive integer
//! `price` (smallest currency unit). Everything else is optional:
//! `currency` defaults to `usd`, the presence of `interval` makes the item
//! a subscription, `downloads` lists binary assets sold with the item, and
//! `slug` pins the canonical URL.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

/// Billing interval for subscriptions. Immutable on the provider side once
/// a product has been created with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Month,
    Year,
    Week,
    Day,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Month => "month",
            Interval::Year => "year",
            Interval::Week => "week",
            Interval::Day => "day",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloadable asset declared in front matter. `file` is relative to the
/// content file's directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    pub title: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Parsed payable front matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payable {
    pub price: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub downloads: Vec<Download>,
}

fn default_currency() -> String {
    "usd".to_string()
}

impl Payable {
    /// Extract payable data from already-parsed front matter. `None` when
    /// the item is free: no `price`, a non-integer price, or price ≤ 0.
    pub fn from_front_matter(front_matter: &Json) -> Option<Payable> {
        let price = front_matter.get("price")?.as_i64()?;
        if price <= 0 {
            return None;
        }

        // Deserialize the whole object; unknown keys are the host site's
        // business and are ignored.
        match serde_json::from_value::<Payable>(front_matter.clone()) {
            Ok(payable) => Some(payable),
            Err(err) => {
                tracing::warn!("malformed payable front matter: {err}");
                None
            }
        }
    }

    pub fn is_subscription(&self) -> bool {
        self.interval.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn free_content_is_not_payable() {
        assert!(Payable::from_front_matter(&json!({ "title": "Free post" })).is_none());
        assert!(Payable::from_front_matter(&json!({ "price": 0 })).is_none());
        assert!(Payable::from_front_matter(&json!({ "price": -100 })).is_none());
        assert!(Payable::from_front_matter(&json!({ "price": "500" })).is_none());
    }

    #[test]
    fn minimal_payable_defaults_currency() {
        let p = Payable::from_front_matter(&json!({ "price": 500 })).unwrap();
        assert_eq!(p.price, 500);
        assert_eq!(p.currency, "usd");
        assert!(p.interval.is_none());
        assert!(!p.is_subscription());
    }

    #[test]
    fn subscription_round_trip() {
        let p = Payable::from_front_matter(&json!({
            "price": 900,
            "currency": "eur",
            "interval": "month",
            "title": "Monthly course",
            "downloads": [{ "title": "Sources", "file": "./files/src.zip" }],
        }))
        .unwrap();
        assert!(p.is_subscription());
        assert_eq!(p.interval, Some(Interval::Month));
        assert_eq!(p.downloads.len(), 1);
        assert_eq!(p.downloads[0].file, "./files/src.zip");
    }

    #[test]
    fn unknown_interval_is_rejected_as_not_payable() {
        // A typo'd interval should not silently become a one-time product.
        assert!(Payable::from_front_matter(&json!({ "price": 500, "interval": "quarter" })).is_none());
    }
}
