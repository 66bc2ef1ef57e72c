//! URL pattern derivation and matching.
//!
//! Include globs describe content *files*; requests arrive as content
//! *URLs*. This module translates between the two: strip the content root,
//! drop the file-extension tail, expand per configured locale path, and for
//! group collections also accept the "stripped" index URL (the group root
//! without the index filename).

use crate::config::{I18nConfig, ResolvedCollection};
use regex::Regex;
use std::sync::LazyLock;

static BRACE_EXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\.\{[^}]+\}$").unwrap());
static PLAIN_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\.(md|mdx|markdown)$").unwrap());

/// Convert an include glob to a URL pattern:
/// `content/blogs/**/*.md` → `/blogs/**/*`.
pub fn include_pattern_to_url_pattern(include: &str) -> String {
    let mut pattern = include.replace('\\', "/");

    // Strip everything up to and including the content root segment.
    if let Some(idx) = pattern.find("content/") {
        pattern = format!("/{}", &pattern[idx + "content/".len()..]);
    } else if !pattern.starts_with('/') {
        pattern = format!("/{pattern}");
    }

    // Drop extension tails: `*.{md,mdx}` and `*.md` both become `*`.
    let pattern = BRACE_EXT.replace(&pattern, "*").to_string();
    PLAIN_EXT.replace(&pattern, "*").to_string()
}

/// Glob-style match of a pathname against a URL pattern (`**` crosses
/// segment boundaries, `*` does not). A trailing slash on the path is
/// tolerated.
pub fn matches_url_pattern(pathname: &str, pattern: &str) -> bool {
    let escaped = regex::escape(pattern)
        .replace(r"\*\*", "___DOUBLESTAR___")
        .replace(r"\*", "[^/]*")
        .replace("___DOUBLESTAR___", ".*");

    match Regex::new(&format!("^{escaped}/?$")) {
        Ok(re) => re.is_match(pathname),
        Err(err) => {
            tracing::warn!(pattern, "unusable URL pattern: {err}");
            false
        }
    }
}

/// Strip the last `/<segment>` from a URL pattern, so group collections can
/// match `/courses/git-essentials` as well as `/courses/git-essentials/*`.
fn strip_last_wildcard_segment(pattern: &str) -> Option<String> {
    let last_slash = pattern.rfind('/')?;
    if last_slash == 0 {
        return None;
    }
    Some(pattern[..last_slash].to_string())
}

/// Build the full URL pattern set for the configured collections, expanded
/// per locale path. When the default locale is unprefixed the bare patterns
/// are kept alongside the prefixed ones.
pub fn build_url_patterns(
    collections: &[ResolvedCollection],
    i18n: Option<&I18nConfig>,
) -> Vec<String> {
    let mut base_patterns = Vec::new();

    for collection in collections {
        let pattern = include_pattern_to_url_pattern(&collection.config.include);
        if collection.config.group.is_some() {
            if let Some(stripped) = strip_last_wildcard_segment(&pattern) {
                base_patterns.push(stripped);
            }
        }
        base_patterns.push(pattern);
    }

    let Some(i18n) = i18n else {
        return base_patterns;
    };

    let mut patterns = Vec::new();
    let mut push = |p: String| {
        if !patterns.contains(&p) {
            patterns.push(p);
        }
    };

    for locale in &i18n.locale_paths {
        for pattern in &base_patterns {
            push(format!("/{locale}{pattern}"));
        }
    }

    if !i18n.prefix_default_locale {
        for pattern in &base_patterns {
            push(pattern.clone());
        }
    }

    patterns
}

/// Is this a URL the paywall should even look at? API routes, framework
/// internals, assets and dotted paths are all someone else's problem.
pub fn should_process_url(pathname: &str, url_patterns: &[String]) -> bool {
    if pathname.starts_with("/api/")
        || pathname.starts_with("/_")
        || pathname.starts_with("/assets/")
        || pathname.contains('.')
    {
        return false;
    }

    url_patterns.iter().any(|p| matches_url_pattern(pathname, p))
}

/// `{locale?}/{collection}/{slug}` parsed from a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    pub locale_path: Option<String>,
    pub collection: String,
    pub slug: String,
}

pub fn parse_pathname(pathname: &str, i18n: Option<&I18nConfig>) -> Option<ParsedPath> {
    let trimmed = pathname.trim_matches('/');
    if trimmed.is_empty() {
        return None;
    }

    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }

    if let Some(i18n) = i18n {
        let maybe_locale = segments[0];
        if i18n.locale_paths.iter().any(|l| l == maybe_locale) {
            if segments.len() < 3 {
                return None;
            }
            return Some(ParsedPath {
                locale_path: Some(maybe_locale.to_string()),
                collection: segments[1].to_string(),
                slug: segments[2..].join("/"),
            });
        }

        if !i18n.prefix_default_locale {
            return Some(ParsedPath {
                locale_path: Some(i18n.default_locale_path.clone()),
                collection: segments[0].to_string(),
                slug: segments[1..].join("/"),
            });
        }

        return None;
    }

    Some(ParsedPath {
        locale_path: None,
        collection: segments[0].to_string(),
        slug: segments[1..].join("/"),
    })
}

/// Public URL for a canonical content ID, locale-aware: IDs of the form
/// `{collection}/{locale}/{rest}` place the locale prefix first and omit it
/// for the unprefixed default locale.
pub fn build_content_url(site_url: &str, canonical_id: &str, i18n: Option<&I18nConfig>) -> String {
    let Some(i18n) = i18n else {
        return format!("{site_url}/{canonical_id}");
    };

    let mut parts = canonical_id.splitn(3, '/');
    let (Some(collection), Some(maybe_locale)) = (parts.next(), parts.next()) else {
        return format!("{site_url}/{canonical_id}");
    };
    let rest = parts.next().unwrap_or("");

    if !i18n.locale_paths.iter().any(|l| l == maybe_locale) {
        return format!("{site_url}/{canonical_id}");
    }

    let prefix = if i18n.prefix_default_locale || maybe_locale != i18n.default_locale_path {
        format!("/{maybe_locale}")
    } else {
        String::new()
    };

    format!("{site_url}{prefix}/{collection}/{rest}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectionConfig, GroupConfig};

    fn collection(include: &str, group: Option<&str>) -> ResolvedCollection {
        let config = CollectionConfig {
            include: include.to_string(),
            group: group.map(|index| GroupConfig {
                index: index.to_string(),
            }),
            ..Default::default()
        };
        ResolvedCollection {
            name: crate::config::infer_collection_name(include).unwrap(),
            config,
        }
    }

    fn i18n(prefix_default: bool) -> I18nConfig {
        I18nConfig {
            locale_paths: vec!["en".into(), "ja".into()],
            default_locale_path: "en".into(),
            prefix_default_locale: prefix_default,
        }
    }

    #[test]
    fn include_pattern_translates_to_url_pattern() {
        assert_eq!(
            include_pattern_to_url_pattern("content/blogs/**/*.md"),
            "/blogs/**/*"
        );
        assert_eq!(
            include_pattern_to_url_pattern("content/courses/**/*.{md,mdx}"),
            "/courses/**/*"
        );
    }

    #[test]
    fn url_pattern_matching_distinguishes_star_kinds() {
        assert!(matches_url_pattern("/blogs/hello", "/blogs/*"));
        assert!(!matches_url_pattern("/blogs/2025/hello", "/blogs/*"));
        assert!(matches_url_pattern("/blogs/2025/hello", "/blogs/**/*"));
        assert!(matches_url_pattern("/blogs/hello/", "/blogs/*"));
    }

    #[test]
    fn group_collections_also_match_stripped_index_url() {
        let patterns = build_url_patterns(
            &[collection("content/courses/**/*.md", Some("toc"))],
            None,
        );
        assert_eq!(patterns, vec!["/courses/**", "/courses/**/*"]);
        assert!(should_process_url("/courses/git-essentials", &patterns));
    }

    #[test]
    fn locale_expansion_keeps_bare_form_for_unprefixed_default() {
        let patterns =
            build_url_patterns(&[collection("content/blogs/**/*.md", None)], Some(&i18n(false)));
        assert!(patterns.contains(&"/en/blogs/**/*".to_string()));
        assert!(patterns.contains(&"/ja/blogs/**/*".to_string()));
        assert!(patterns.contains(&"/blogs/**/*".to_string()));

        let prefixed =
            build_url_patterns(&[collection("content/blogs/**/*.md", None)], Some(&i18n(true)));
        assert!(!prefixed.contains(&"/blogs/**/*".to_string()));
    }

    #[test]
    fn system_and_asset_paths_are_skipped() {
        let patterns = vec!["/blogs/**/*".to_string()];
        assert!(!should_process_url("/api/tollgate/checkout", &patterns));
        assert!(!should_process_url("/_internal/chunk.js", &patterns));
        assert!(!should_process_url("/assets/logo.png", &patterns));
        assert!(!should_process_url("/blogs/cover.jpg", &patterns));
        assert!(should_process_url("/blogs/hello", &patterns));
    }

    #[test]
    fn pathname_parsing_handles_locales() {
        assert_eq!(
            parse_pathname("/blogs/2025/hello", None),
            Some(ParsedPath {
                locale_path: None,
                collection: "blogs".into(),
                slug: "2025/hello".into(),
            })
        );

        let cfg = i18n(false);
        assert_eq!(
            parse_pathname("/ja/blogs/hello", Some(&cfg)),
            Some(ParsedPath {
                locale_path: Some("ja".into()),
                collection: "blogs".into(),
                slug: "hello".into(),
            })
        );
        // unprefixed default locale
        assert_eq!(
            parse_pathname("/blogs/hello", Some(&cfg)),
            Some(ParsedPath {
                locale_path: Some("en".into()),
                collection: "blogs".into(),
                slug: "hello".into(),
            })
        );
        assert_eq!(parse_pathname("/blogs", Some(&cfg)).map(|p| p.collection), None);
    }

    #[test]
    fn content_url_places_locale_before_collection() {
        let cfg = i18n(false);
        assert_eq!(
            build_content_url("https://example.com", "blogs/ja/hello", Some(&cfg)),
            "https://example.com/ja/blogs/hello"
        );
        // default locale is unprefixed
        assert_eq!(
            build_content_url("https://example.com", "blogs/en/hello", Some(&cfg)),
            "https://example.com/blogs/hello"
        );
        // no locale segment: passthrough
        assert_eq!(
            build_content_url("https://example.com", "blogs/hello", Some(&cfg)),
            "https://example.com/blogs/hello"
        );
        assert_eq!(
            build_content_url("https://example.com", "blogs/hello", None),
            "https://example.com/blogs/hello"
        );
    }
}
