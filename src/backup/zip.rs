use crate::error::{ArchiveError, Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Extractor for the workspace backup archive (ZIP)
pub struct ZipExtractor;

impl ZipExtractor {
    /// Extract a single ZIP entry to disk, creating directories as needed
    fn extract_entry(mut file: zip::read::ZipFile, dest_path: &Path) -> Result<Option<PathBuf>> {
        let file_path = match file.enclosed_name() {
            Some(path) => dest_path.join(path),
            None => {
                warn!(entry = file.name(), "skipping entry with unsafe path");
                return Ok(None);
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path)?;
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut outfile = std::fs::File::create(&file_path)?;
        std::io::copy(&mut file, &mut outfile)?;
        Ok(Some(file_path))
    }

    /// Extract every entry of `archive_path` below `dest_path`
    ///
    /// Returns the extracted file paths (directories are created but not listed).
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?dest_path, "extracting backup archive");

        std::fs::create_dir_all(dest_path)?;

        let file = std::fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            Error::Archive(ArchiveError::ExtractionFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read ZIP archive: {}", e),
            })
        })?;

        let mut extracted_files = Vec::new();
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| {
                Error::Archive(ArchiveError::ExtractionFailed {
                    archive: archive_path.to_path_buf(),
                    reason: format!("failed to read ZIP entry {}: {}", i, e),
                })
            })?;

            if let Some(file_path) = Self::extract_entry(entry, dest_path)? {
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "backup extraction successful"
        );
        Ok(extracted_files)
    }
}
