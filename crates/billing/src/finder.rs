//! Metadata-candidate search over paginated provider listings.
//!
//! Content IDs written by older sync runs may be shortened spellings, so a
//! lookup tries every candidate in order — canonical first — and inside one
//! candidate pages through the listing until an item's normalized
//! `metadata` value equals the candidate exactly. The ordering guarantees a
//! canonical match always wins over a legacy alias.

use crate::types::{MetadataValue, Page};
use crate::Result;
use std::future::Future;

/// Normalise metadata values so numeric and string spellings compare equal.
pub fn normalise_metadata_value(value: Option<&MetadataValue>) -> Option<String> {
    match value {
        Some(MetadataValue::String(s)) => Some(s.clone()),
        Some(MetadataValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn has_more_pages<T>(page: &Page<T>, current: u32) -> bool {
    !page.items.is_empty() && current < page.pagination.max_page
}

/// First item across all pages matching `predicate`. `fetch_page` receives
/// a 1-based page number.
pub async fn find_first_list_item<T, F, Fut>(
    mut fetch_page: F,
    predicate: impl Fn(&T) -> bool,
) -> Result<Option<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut page_no = 1;
    loop {
        let page = fetch_page(page_no).await?;
        let more = has_more_pages(&page, page_no);
        if let Some(item) = page.items.into_iter().find(&predicate) {
            return Ok(Some(item));
        }
        if !more {
            return Ok(None);
        }
        page_no += 1;
    }
}

/// Search for an entity by checking multiple candidate metadata values.
/// `fetch_page` receives the candidate (so it can be pushed down as a
/// server-side filter) and a 1-based page number; `metadata_value` extracts
/// the field being matched.
pub async fn find_by_metadata_candidates<T, F, Fut>(
    candidates: &[String],
    mut fetch_page: F,
    metadata_value: impl Fn(&T) -> Option<&MetadataValue>,
) -> Result<Option<T>>
where
    F: FnMut(String, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    for candidate in candidates {
        let mut page_no = 1;
        loop {
            let page = fetch_page(candidate.clone(), page_no).await?;
            let more = has_more_pages(&page, page_no);

            let matched = page
                .items
                .into_iter()
                .find(|item| normalise_metadata_value(metadata_value(item)).as_deref()
                    == Some(candidate.as_str()));
            if let Some(item) = matched {
                return Ok(Some(item));
            }

            if !more {
                break;
            }
            page_no += 1;
        }
    }

    Ok(None)
}
