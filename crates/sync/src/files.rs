//! Content-file discovery and front-matter parsing for the build-time sync.
//!
//! Include patterns are project-relative globs (`content/blogs/**/*.md`).
//! Discovery walks the pattern's static prefix and filters the relative
//! paths against the glob translated to a regex, sorted for predictable
//! ordering and failure attribution.

use crate::{Result, SyncError};
use gray_matter::engine::YAML;
use gray_matter::Matter;
use regex::Regex;
use serde_json::Value as Json;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Translate a glob to an anchored regex: `**` crosses `/`, `*` does not,
/// `{a,b}` is alternation.
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    // swallow a following slash so `**/` also matches zero dirs
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        regex.push_str("(?:.*/)?");
                    } else {
                        regex.push_str(".*");
                    }
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            '{' => {
                let mut alternatives = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    alternatives.push(inner);
                }
                if !closed {
                    return Err(SyncError::InvalidPattern {
                        pattern: pattern.to_string(),
                        message: "unterminated `{` group".to_string(),
                    });
                }
                let escaped: Vec<String> = alternatives
                    .split(',')
                    .map(|alt| regex::escape(alt.trim()))
                    .collect();
                regex.push_str(&format!("(?:{})", escaped.join("|")));
            }
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');

    Regex::new(&regex).map_err(|e| SyncError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// The longest pattern prefix with no glob metacharacters; walking starts
/// there instead of the project root.
fn static_prefix(pattern: &str) -> &str {
    let meta = pattern
        .find(['*', '?', '{'])
        .unwrap_or(pattern.len());
    match pattern[..meta].rfind('/') {
        Some(idx) => &pattern[..idx],
        None => "",
    }
}

/// Files under `project_root` matching the include pattern, sorted.
pub fn discover_files(project_root: &Path, include: &str) -> Result<Vec<PathBuf>> {
    let pattern = include.replace('\\', "/");
    let regex = glob_to_regex(&pattern)?;
    let walk_root = project_root.join(static_prefix(&pattern));

    if !walk_root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&walk_root).follow_links(false) {
        let entry = entry.map_err(|e| SyncError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(project_root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if regex.is_match(&relative) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Parse a markdown document into `(front_matter, body)`. Content without
/// front matter yields `(None, body)`.
pub fn parse_document(text: &str) -> (Option<Json>, String) {
    let matter: Matter<YAML> = Matter::new();
    match matter.parse::<Json>(text) {
        Ok(parsed) => {
            let body = parsed.content;
            (parsed.data, body)
        }
        Err(_) => (None, text.to_string()),
    }
}
