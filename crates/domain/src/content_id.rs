//! Canonical content identity.
//!
//! Every content file maps to exactly one canonical ID of the form
//! `{collection}/{slug}`. The slug is derived from the file path unless the
//! front matter pins one explicitly. Remote metadata written by older sync
//! runs may carry shortened spellings, so lookups go through
//! `content_id_candidates` which enumerates the tolerated aliases.

use std::collections::HashMap;
use std::path::Path;

/// Dictionary-safe slug generator: repeated identical slugs within one
/// derivation get a `-1`, `-2`… suffix so sibling segments never collide.
#[derive(Debug, Default)]
pub struct Slugger {
    seen: HashMap<String, usize>,
}

impl Slugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slugify one path segment: lowercase, keep alphanumerics/`-`/`_`,
    /// turn whitespace into `-`, drop everything else, trim dashes.
    pub fn slug(&mut self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for ch in value.chars() {
            if ch.is_alphanumeric() {
                out.extend(ch.to_lowercase());
            } else if ch == '-' || ch == '_' {
                out.push(ch);
            } else if ch.is_whitespace() {
                out.push('-');
            }
            // anything else is dropped, like a dictionary slugger would
        }
        let base = out.trim_matches('-').to_string();

        let count = self.seen.entry(base.clone()).or_insert(0);
        let slug = if *count == 0 {
            base.clone()
        } else {
            format!("{base}-{count}")
        };
        *count += 1;
        slug
    }
}

fn normalise_slug(value: &str) -> String {
    value.replace('\\', "/").trim_matches('/').to_string()
}

fn strip_content_extension(path: &str) -> &str {
    for ext in [".md", ".mdx", ".markdown"] {
        if path.len() > ext.len() && path[path.len() - ext.len()..].eq_ignore_ascii_case(ext) {
            return &path[..path.len() - ext.len()];
        }
    }
    path
}

/// Slugify a relative path into a slug: each segment through one `Slugger`,
/// joined with `/`, trailing `index` segment dropped.
pub fn slugify_path(path: &str) -> String {
    let without_ext = strip_content_extension(path);
    let segments: Vec<&str> = without_ext.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return String::new();
    }

    let mut slugger = Slugger::new();
    let slugged: Vec<String> = segments.iter().map(|s| slugger.slug(s)).collect();
    let slug = slugged.join("/");
    slug.strip_suffix("/index").unwrap_or(&slug).to_string()
}

fn build_canonical(collection: &str, slug: &str) -> String {
    format!("{collection}/{}", normalise_slug(slug))
}

/// Resolve the path segments after the last occurrence of the collection
/// name; if the collection never appears, the whole path is used.
fn resolve_relative_path(normalized: &str, collection: &str) -> String {
    let cleaned = normalized.trim_start_matches('/');
    let segments: Vec<&str> = cleaned.split('/').filter(|s| !s.is_empty()).collect();

    if let Some(idx) = segments.iter().rposition(|s| *s == collection) {
        return segments[idx + 1..].join("/");
    }

    cleaned.to_string()
}

fn resolve_slug(relative_path: &str, frontmatter_slug: Option<&str>) -> String {
    // An explicit front-matter slug is used verbatim so authors can pin
    // stable URLs; it is deliberately not re-slugified.
    if let Some(s) = frontmatter_slug {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    slugify_path(relative_path)
}

/// Convert a content file path to its canonical `{collection}/{slug}` ID.
pub fn path_to_content_id(
    file_path: &Path,
    collection: &str,
    content_root: &Path,
    frontmatter_slug: Option<&str>,
) -> String {
    let relative = file_path
        .strip_prefix(content_root)
        .unwrap_or(file_path)
        .to_string_lossy()
        .replace('\\', "/");

    let relative_path = resolve_relative_path(&relative, collection);
    let slug = resolve_slug(&relative_path, frontmatter_slug);
    build_canonical(collection, &slug)
}

/// Canonical ID for a runtime content-store entry. Prefers the store's own
/// slug over the raw entry key.
pub fn entry_to_content_id(collection: &str, entry_id: &str, entry_slug: Option<&str>) -> String {
    let slug = match entry_slug {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => entry_id.trim_start_matches('/').to_string(),
    };
    build_canonical(collection, &slug)
}

/// Alternate spellings tolerated when matching remote metadata: the ID
/// itself, the collection-less suffix, and the bare last segment. Order
/// matters — the canonical form is always tried first.
pub fn content_id_candidates(content_id: &str) -> Vec<String> {
    let normalized = content_id.replace('\\', "/");
    let without_ext = strip_content_extension(&normalized).to_string();

    let mut candidates = vec![normalized.clone()];
    let mut push = |c: String| {
        if !c.is_empty() && !candidates.contains(&c) {
            candidates.push(c);
        }
    };

    push(without_ext.clone());

    if without_ext.contains('/') {
        let segments: Vec<&str> = without_ext.split('/').collect();
        if segments.len() > 1 {
            push(segments[1..].join("/"));
        }
        if let Some(last) = segments.last() {
            push((*last).to_string());
        }
    }

    candidates
}

/// Index-item ID candidates for a group collection: the locale-prefixed
/// spelling first when a locale is in play, then the bare one.
pub fn index_id_candidates(
    locale_path: Option<&str>,
    slug: &str,
    group_index: &str,
) -> Vec<String> {
    let index_slug = format!("{slug}/{group_index}");
    match locale_path {
        None => vec![index_slug],
        Some(locale) => vec![format!("{locale}/{index_slug}"), index_slug],
    }
}
