//! In-memory content store.
//!
//! Scanned once at startup: every configured collection directory is walked
//! for markdown files, front matter is parsed, and entries are indexed by
//! their slug (front-matter override first, path-derived otherwise). The
//! middleware resolves request URLs against this index.

use crate::{Result, ServeError};
use domain::config::ResolvedCollection;
use domain::content_id::{entry_to_content_id, slugify_path};
use domain::payable::Payable;
use gray_matter::engine::YAML;
use gray_matter::Matter;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

const CONTENT_EXTS: &[&str] = &["md", "mdx", "markdown"];

#[derive(Debug, Clone)]
pub struct Entry {
    /// Collection-relative path, forward slashes.
    pub id: String,
    pub slug: String,
    pub front_matter: Json,
    pub body: String,
}

impl Entry {
    pub fn payable(&self) -> Option<Payable> {
        Payable::from_front_matter(&self.front_matter)
    }

    pub fn canonical_id(&self, collection: &str) -> String {
        entry_to_content_id(collection, &self.id, Some(&self.slug))
    }

    pub fn title(&self) -> Option<&str> {
        self.front_matter.get("title").and_then(|v| v.as_str())
    }

    pub fn description(&self) -> Option<&str> {
        self.front_matter.get("description").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Default)]
pub struct ContentStore {
    /// collection name → slug → entry
    collections: HashMap<String, HashMap<String, Entry>>,
}

impl ContentStore {
    /// Walk `content_root/{collection}` for every configured collection.
    /// Unreadable files are skipped with a warning; the store itself only
    /// fails when a collection directory cannot be walked at all.
    #[tracing::instrument(skip_all)]
    pub fn scan(content_root: &Path, collections: &[ResolvedCollection]) -> Result<Self> {
        let mut store = ContentStore::default();

        for collection in collections {
            let dir = content_root.join(&collection.name);
            let mut entries: HashMap<String, Entry> = HashMap::new();

            if !dir.exists() {
                tracing::warn!(collection = %collection.name, dir = %dir.display(), "collection directory missing");
                store.collections.insert(collection.name.clone(), entries);
                continue;
            }

            for item in WalkDir::new(&dir).follow_links(false) {
                let item = item.map_err(|e| ServeError::Scan(e.to_string()))?;
                if !item.file_type().is_file() || !has_content_ext(item.path()) {
                    continue;
                }

                let relative = item
                    .path()
                    .strip_prefix(&dir)
                    .unwrap_or(item.path())
                    .to_string_lossy()
                    .replace('\\', "/");

                let text = match fs::read_to_string(item.path()) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::warn!(path = %item.path().display(), "skipping unreadable content file: {err}");
                        continue;
                    }
                };

                let (front_matter, body) = parse_front_matter(&text);
                let slug = front_matter
                    .get("slug")
                    .and_then(|v| v.as_str())
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| slugify_path(&relative));

                if slug.is_empty() {
                    continue;
                }

                let entry = Entry {
                    id: relative,
                    slug: slug.clone(),
                    front_matter,
                    body,
                };

                if let Some(previous) = entries.insert(slug.clone(), entry) {
                    tracing::warn!(
                        collection = %collection.name,
                        slug,
                        shadowed = %previous.id,
                        "duplicate slug; later file wins"
                    );
                }
            }

            tracing::debug!(collection = %collection.name, entries = entries.len(), "scanned");
            store.collections.insert(collection.name.clone(), entries);
        }

        Ok(store)
    }

    pub fn entry(&self, collection: &str, slug: &str) -> Option<&Entry> {
        self.collections.get(collection)?.get(slug)
    }

    /// Locale-aware lookup: the locale-prefixed slug first, then the bare
    /// one (content for the unprefixed default locale usually lives at the
    /// collection root).
    pub fn entry_localized(
        &self,
        collection: &str,
        locale_path: Option<&str>,
        slug: &str,
    ) -> Option<&Entry> {
        if let Some(locale) = locale_path {
            if let Some(entry) = self.entry(collection, &format!("{locale}/{slug}")) {
                return Some(entry);
            }
        }
        self.entry(collection, slug)
    }

    #[cfg(test)]
    pub fn insert(&mut self, collection: &str, entry: Entry) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(entry.slug.clone(), entry);
    }
}

fn has_content_ext(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| CONTENT_EXTS.iter().any(|c| e.eq_ignore_ascii_case(c)))
        .unwrap_or(false)
}

fn parse_front_matter(text: &str) -> (Json, String) {
    let matter: Matter<YAML> = Matter::new();
    match matter.parse::<Json>(text) {
        Ok(parsed) => (
            parsed.data.unwrap_or(Json::Null),
            parsed.content,
        ),
        Err(_) => (Json::Null, text.to_string()),
    }
}
