//! Downloadable upload pipeline.
//!
//! Uploads each declared download once: unchanged checksums are skipped,
//! byte-identical files under a new path reuse the already-uploaded remote
//! file ID, and only genuinely new bytes go through the provider's
//! create → presigned PUT → complete dance. State is flushed after every
//! file so an interrupted run loses at most one upload.

use crate::files::{discover_files, parse_document};
use crate::state::{
    find_file_by_checksum, normalize_file_key, read_state_file, set_content_files_in_state,
    update_file_in_state, write_state_file, StateFileEntry,
};
use crate::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use billing::client::BillingClient;
use billing::types::{FileCreate, FileUploadCompleted, FileUploadPlan, UploadPartPlan, UploadedPart};
use billing::BillingError;
use domain::config::GateConfig;
use domain::content_id::path_to_content_id;
use domain::pattern::build_content_url;
use domain::payable::Payable;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Hex SHA-256, the state-file dedup key.
pub fn checksum_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn checksum_base64(bytes: &[u8]) -> String {
    BASE64.encode(Sha256::digest(bytes))
}

/// MIME type from the file extension; unknown extensions are octet-stream.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" | "tgz" => "application/gzip",
        "md" => "text/markdown",
        "txt" => "text/plain",
        "json" => "application/json",
        "xml" => "application/xml",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        _ => "application/octet-stream",
    }
}

/// Upload one file and return its remote file ID.
#[tracing::instrument(skip(client))]
pub async fn upload_file(client: &BillingClient, file_path: &Path) -> Result<String> {
    let bytes = fs::read(file_path)?;
    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "download".to_string());
    let size = bytes.len() as u64;
    let checksum = checksum_base64(&bytes);

    let created = client
        .create_file(&FileCreate {
            name: file_name.clone(),
            mime_type: mime_type_for(&file_name).to_string(),
            size,
            service: "downloadable".to_string(),
            checksum_sha256_base64: checksum.clone(),
            upload: FileUploadPlan {
                parts: vec![UploadPartPlan {
                    number: 1,
                    chunk_start: 0,
                    chunk_end: size,
                    checksum_sha256_base64: Some(checksum.clone()),
                }],
            },
        })
        .await?;

    let part = created
        .upload
        .parts
        .first()
        .ok_or_else(|| BillingError::MissingUploadPart {
            file: file_name.clone(),
        })?;

    let etag = client.upload_part(part, bytes).await?;

    client
        .complete_file_upload(
            &created.id,
            &FileUploadCompleted {
                id: created.upload.id.clone(),
                path: created.upload.path.clone(),
                parts: vec![UploadedPart {
                    number: part.number,
                    checksum_etag: etag,
                    checksum_sha256_base64: part
                        .checksum_sha256_base64
                        .clone()
                        .unwrap_or(checksum),
                }],
            },
        )
        .await?;

    Ok(created.id)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub reused: usize,
}

/// Walk every collection and bring the remote file set up to date with the
/// declared downloads.
#[tracing::instrument(skip_all)]
pub async fn upload_downloadables(
    config: &GateConfig,
    client: &BillingClient,
    project_root: &Path,
) -> Result<UploadSummary> {
    tracing::info!("uploading downloadable files");

    let content_root = project_root.join(&config.content_root);
    let mut state = read_state_file(project_root);
    let mut summary = UploadSummary::default();

    for collection in &config.collections {
        let pattern = &collection.config.include;
        let files = discover_files(project_root, pattern)
            .map_err(|e| e.for_pattern(pattern.clone()))?;

        if files.is_empty() {
            tracing::warn!(%pattern, "no files found for pattern");
            continue;
        }

        for file_path in files {
            let result: Result<()> = async {
                let text = fs::read_to_string(&file_path)?;
                let (front_matter, _body) = parse_document(&text);
                let Some(payable) =
                    front_matter.as_ref().and_then(Payable::from_front_matter)
                else {
                    return Ok(());
                };
                if payable.downloads.is_empty() {
                    return Ok(());
                }

                let canonical_id = path_to_content_id(
                    &file_path,
                    &collection.name,
                    &content_root,
                    payable.slug.as_deref(),
                );
                let content_url =
                    build_content_url(&config.site_url, &canonical_id, config.i18n.as_ref());
                tracing::info!(content = %canonical_id, "processing downloads");

                let content_dir = file_path.parent().unwrap_or(Path::new("."));
                let mut file_keys = Vec::new();

                for download in &payable.downloads {
                    let absolute = normalized_join(content_dir, &download.file);
                    let file_key = normalize_file_key(&absolute, project_root);
                    let bytes = fs::read(&absolute)?;
                    let checksum = checksum_hex(&bytes);
                    drop(bytes);

                    if let Some(cached) = state.files.get(&file_key) {
                        if cached.checksum == checksum {
                            tracing::info!(file = %download.title, "skipped (unchanged)");
                            let refreshed = StateFileEntry {
                                local_path: download.file.clone(),
                                ..cached.clone()
                            };
                            update_file_in_state(&mut state, &file_key, refreshed);
                            file_keys.push(file_key);
                            summary.skipped += 1;
                            set_content_files_in_state(
                                &mut state,
                                &canonical_id,
                                &content_url,
                                &file_keys,
                            );
                            write_state_file(&state, project_root)?;
                            continue;
                        }
                    }

                    if let Some((_, duplicate)) =
                        find_file_by_checksum(&state, &checksum, Some(&file_key))
                    {
                        tracing::info!(file = %download.title, "reusing existing upload");
                        let reused = StateFileEntry {
                            remote_file_id: duplicate.remote_file_id.clone(),
                            checksum: checksum.clone(),
                            local_path: download.file.clone(),
                        };
                        update_file_in_state(&mut state, &file_key, reused);
                        file_keys.push(file_key);
                        summary.reused += 1;
                        set_content_files_in_state(
                            &mut state,
                            &canonical_id,
                            &content_url,
                            &file_keys,
                        );
                        write_state_file(&state, project_root)?;
                        continue;
                    }

                    tracing::info!(file = %download.title, "uploading");
                    let remote_file_id = upload_file(client, &absolute).await?;
                    update_file_in_state(
                        &mut state,
                        &file_key,
                        StateFileEntry {
                            remote_file_id,
                            checksum,
                            local_path: download.file.clone(),
                        },
                    );
                    file_keys.push(file_key);
                    summary.uploaded += 1;
                    set_content_files_in_state(
                        &mut state,
                        &canonical_id,
                        &content_url,
                        &file_keys,
                    );
                    write_state_file(&state, project_root)?;
                }

                set_content_files_in_state(&mut state, &canonical_id, &content_url, &file_keys);
                write_state_file(&state, project_root)?;
                Ok(())
            }
            .await;

            result.map_err(|e| e.for_file(&file_path))?;
        }
    }

    write_state_file(&state, project_root)?;
    tracing::info!(
        uploaded = summary.uploaded,
        skipped = summary.skipped,
        reused = summary.reused,
        "upload complete"
    );

    Ok(summary)
}

/// Join a content-relative download path, resolving `./` and `../`.
fn normalized_join(base: &Path, relative: &str) -> std::path::PathBuf {
    let mut out = base.to_path_buf();
    for segment in relative.replace('\\', "/").split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn checksums_are_stable_hex() {
        let c = checksum_hex(b"hello");
        assert_eq!(c.len(), 64);
        assert_eq!(c, checksum_hex(b"hello"));
        assert_ne!(c, checksum_hex(b"hello!"));
    }

    #[test]
    fn mime_types_cover_the_common_cases() {
        assert_eq!(mime_type_for("source.zip"), "application/zip");
        assert_eq!(mime_type_for("GUIDE.PDF"), "application/pdf");
        assert_eq!(mime_type_for("unknown.xyz"), "application/octet-stream");
        assert_eq!(mime_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn relative_download_paths_resolve() {
        let base = PathBuf::from("/root/content/blogs");
        assert_eq!(
            normalized_join(&base, "./files/src.zip"),
            PathBuf::from("/root/content/blogs/files/src.zip")
        );
        assert_eq!(
            normalized_join(&base, "../shared/kit.zip"),
            PathBuf::from("/root/content/shared/kit.zip")
        );
    }
}
