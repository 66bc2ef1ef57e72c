//! Per-request paywall state.

use crate::payable::Interval;
use serde::{Deserialize, Serialize};

/// A downloadable file exposed to a granted visitor. `download_url` is the
/// provider's signed URL and expires with the customer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadFile {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub size_formatted: String,
    pub mime_type: String,
    pub download_url: String,
    /// Newest of several uploads sharing one file name.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_new: bool,
    /// Superseded version of a file that was re-uploaded.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_legacy: bool,
}

/// Derived view of one matched request, created by the middleware and
/// consumed by the page render. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaywallState {
    pub is_payable: bool,
    pub is_authenticated: bool,
    pub has_access: bool,
    pub product_id: String,
    pub content_id: String,
    /// Price in the smallest currency unit; omitted for children that
    /// inherit a parent's entitlement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Paywall fragment shown instead of the full body; only set when
    /// access was denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub has_downloads: bool,
    pub download_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloadable_files: Option<Vec<DownloadFile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloadable_section: Option<String>,
}

/// Humanize a byte count for the download panel.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sizes_humanize() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn default_state_is_inert() {
        let state = PaywallState::default();
        assert!(!state.is_payable);
        assert!(!state.has_access);
        assert!(state.preview.is_none());
    }
}
