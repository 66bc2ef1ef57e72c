//! Downloadable-file views for granted visitors.

use billing::types::Downloadable;
use chrono::{DateTime, Utc};
use domain::paywall::{format_file_size, DownloadFile};

/// Convert portal downloadables into render-ready views, with version
/// badges: files sharing a name are sorted newest-first by modification
/// time; the first is `is_new`, the rest `is_legacy`.
pub fn convert(items: Vec<Downloadable>) -> Vec<DownloadFile> {
    let mut files: Vec<(DownloadFile, Option<DateTime<Utc>>)> = items
        .into_iter()
        .map(|item| {
            let file = DownloadFile {
                id: item.id,
                name: item.file.name.clone(),
                size: item.file.size,
                size_formatted: format_file_size(item.file.size),
                mime_type: item.file.mime_type,
                download_url: item.file.download.url,
                is_new: false,
                is_legacy: false,
            };
            (file, item.file.last_modified_at)
        })
        .collect();

    detect_versions(&mut files);
    files.into_iter().map(|(file, _)| file).collect()
}

fn detect_versions(files: &mut [(DownloadFile, Option<DateTime<Utc>>)]) {
    use std::collections::HashMap;

    let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, (file, _)) in files.iter().enumerate() {
        by_name.entry(file.name.clone()).or_default().push(idx);
    }

    for indices in by_name.values() {
        if indices.len() < 2 {
            continue;
        }

        let mut ordered = indices.clone();
        ordered.sort_by_key(|&idx| {
            std::cmp::Reverse(files[idx].1.map(|t| t.timestamp()).unwrap_or(0))
        });

        files[ordered[0]].0.is_new = true;
        for &idx in &ordered[1..] {
            files[idx].0.is_legacy = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing::types::{DownloadLink, DownloadableFileInfo};
    use chrono::TimeZone;

    fn downloadable(id: &str, name: &str, modified: Option<i64>) -> Downloadable {
        Downloadable {
            id: id.to_string(),
            file: DownloadableFileInfo {
                name: name.to_string(),
                size: 2048,
                mime_type: "application/zip".to_string(),
                download: DownloadLink {
                    url: format!("https://files.example.com/{id}"),
                },
                last_modified_at: modified.map(|t| Utc.timestamp_opt(t, 0).unwrap()),
            },
        }
    }

    #[test]
    fn conversion_fills_render_fields() {
        let files = convert(vec![downloadable("f1", "kit.zip", None)]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size_formatted, "2.0 KB");
        assert_eq!(files[0].download_url, "https://files.example.com/f1");
        assert!(!files[0].is_new && !files[0].is_legacy);
    }

    #[test]
    fn duplicate_names_get_version_badges() {
        let files = convert(vec![
            downloadable("old", "kit.zip", Some(1_700_000_000)),
            downloadable("new", "kit.zip", Some(1_725_000_000)),
            downloadable("other", "guide.pdf", Some(1_725_000_000)),
        ]);

        let newest = files.iter().find(|f| f.id == "new").unwrap();
        let oldest = files.iter().find(|f| f.id == "old").unwrap();
        let single = files.iter().find(|f| f.id == "other").unwrap();

        assert!(newest.is_new && !newest.is_legacy);
        assert!(oldest.is_legacy && !oldest.is_new);
        assert!(!single.is_new && !single.is_legacy);
    }
}
