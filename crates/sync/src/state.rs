//! Durable upload state.
//!
//! A JSON document mapping normalized local file paths to previously
//! uploaded remote file IDs (keyed dedup by SHA-256 checksum) plus, per
//! content ID, the ordered list of file keys it references. The build
//! favors availability over strict history: a missing or corrupt state
//! file reads as empty with a warning, never a failure.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = "tollgate";
pub const STATE_FILE: &str = "state.json";

/// Metadata stored for each uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFileEntry {
    pub remote_file_id: String,
    pub checksum: String,
    pub local_path: String,
}

/// File references held by one content item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStateEntry {
    pub content_url: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub files: BTreeMap<String, StateFileEntry>,
    #[serde(default)]
    pub contents: BTreeMap<String, ContentStateEntry>,
}

pub fn state_file_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join(STATE_FILE)
}

/// Normalise a file path for use as a state key: relative to `base_dir`
/// when inside it, absolute otherwise, forward slashes throughout.
pub fn normalize_file_key(file_path: &Path, base_dir: &Path) -> String {
    let used = match file_path.strip_prefix(base_dir) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
        _ => file_path.to_path_buf(),
    };
    used.to_string_lossy().replace('\\', "/")
}

/// Read state from disk; missing or unparseable files are empty state.
#[tracing::instrument(skip_all)]
pub fn read_state_file(project_root: &Path) -> StateFile {
    let path = state_file_path(project_root);
    if !path.exists() {
        return StateFile::default();
    }

    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(path = %path.display(), "unreadable state file, starting empty: {err}");
                StateFile::default()
            }
        },
        Err(err) => {
            tracing::warn!(path = %path.display(), "failed to read state file, starting empty: {err}");
            StateFile::default()
        }
    }
}

/// Atomic write: tmp file, fsync, rename.
#[tracing::instrument(skip_all)]
pub fn write_state_file(state: &StateFile, project_root: &Path) -> Result<()> {
    let path = state_file_path(project_root);
    let failed = |message: String| SyncError::State {
        path: path.clone(),
        message,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| failed(e.to_string()))?;
    }

    let data = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("tmp");
    {
        let mut f = File::create(&tmp).map_err(|e| failed(e.to_string()))?;
        f.write_all(&data).map_err(|e| failed(e.to_string()))?;
        f.sync_all().map_err(|e| failed(e.to_string()))?;
    }
    fs::rename(&tmp, &path).map_err(|e| failed(e.to_string()))?;

    Ok(())
}

/// Linear scan for a checksum match under a different key; this is the
/// content-addressed reuse that keeps rebuilds from re-uploading bytes.
pub fn find_file_by_checksum<'a>(
    state: &'a StateFile,
    checksum: &str,
    exclude_key: Option<&str>,
) -> Option<(&'a str, &'a StateFileEntry)> {
    state
        .files
        .iter()
        .filter(|(key, _)| exclude_key != Some(key.as_str()))
        .find(|(_, entry)| entry.checksum == checksum)
        .map(|(key, entry)| (key.as_str(), entry))
}

/// Pure upsert of one file entry; callers persist after each mutation.
pub fn update_file_in_state(state: &mut StateFile, file_key: &str, entry: StateFileEntry) {
    state.files.insert(file_key.to_string(), entry);
}

/// Point a content ID at an ordered, deduplicated list of file keys.
pub fn set_content_files_in_state(
    state: &mut StateFile,
    content_id: &str,
    content_url: &str,
    file_keys: &[String],
) {
    let mut ordered = Vec::new();
    for key in file_keys {
        if !ordered.contains(key) {
            ordered.push(key.clone());
        }
    }

    state.contents.insert(
        content_id.to_string(),
        ContentStateEntry {
            content_url: content_url.to_string(),
            files: ordered,
        },
    );
}

/// Remote file IDs referenced by a content item, resolved through `files`.
pub fn cached_file_ids(state: &StateFile, content_id: &str) -> Vec<String> {
    let Some(entry) = state.contents.get(content_id) else {
        return Vec::new();
    };

    entry
        .files
        .iter()
        .filter_map(|key| state.files.get(key))
        .map(|file| file.remote_file_id.clone())
        .collect()
}

pub fn remove_content_from_state(state: &mut StateFile, content_id: &str) {
    state.contents.remove(content_id);
}

pub fn content_ids_with_files(state: &StateFile) -> Vec<String> {
    state
        .contents
        .iter()
        .filter(|(_, entry)| !entry.files.is_empty())
        .map(|(content_id, _)| content_id.clone())
        .collect()
}
