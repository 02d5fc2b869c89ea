//! Bulk workspace backup
//!
//! Independent of tree resolution: the whole workspace is exported by the
//! remote service as a Markdown ZIP bundle, saved locally, then extracted.
//! A failure here aborts session startup.

mod zip;

pub use self::zip::ZipExtractor;

use crate::config::Config;
use crate::credential::{Credential, auth_headers};
use crate::error::{ArchiveError, Error, Result};
use crate::retry::with_retry;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// URL of the workspace archive export
pub fn archive_url(config: &Config) -> String {
    format!(
        "{}/export/brains/{}.zip?format=md",
        config.endpoints.files_url.trim_end_matches('/'),
        config.workspace.brain_id
    )
}

/// Download the workspace archive to `backup.archive_path`
///
/// The body is streamed to disk chunk by chunk. Returns the number of bytes written.
pub async fn download_backup(
    client: &reqwest::Client,
    config: &Config,
    credential: &Credential,
) -> Result<u64> {
    let url = archive_url(config);
    let headers = auth_headers(config, credential)?;
    let target = &config.backup.archive_path;
    info!(brain_id = %config.workspace.brain_id, "creating backup");

    let mut response = with_retry(&config.retry, || {
        let request = client.get(&url).headers(headers.clone());
        async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::Archive(ArchiveError::DownloadFailed {
                    status: status.as_u16(),
                }));
            }
            Ok(response)
        }
    })
    .await?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(target).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        written += chunk.len() as u64;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    info!(path = %target.display(), bytes = written, "backup downloaded");
    Ok(written)
}

/// Extract a downloaded archive into `dest`
///
/// Runs on the blocking pool since the ZIP reader is synchronous.
pub async fn extract_backup(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || ZipExtractor::extract(&archive, &dest))
        .await
        .map_err(|e| Error::Other(format!("extraction task failed: {}", e)))?
}
