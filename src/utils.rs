//! Utility functions for output paths

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Longest file stem produced by [`sanitize_file_name`]
const MAX_FILE_STEM_CHARS: usize = 120;

/// Get a unique path for a file, handling collisions according to the specified action
///
/// For Rename this may add a ` (n)` suffix. For Skip an existing file is an
/// error. For Overwrite the original path is returned unchanged.
///
/// # Examples
///
/// ```
/// use brain_mirror::utils::get_unique_path;
/// use brain_mirror::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/Meeting Notes.pdf");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// // If the file exists, returns "/tmp/Meeting Notes (1).pdf", and so on.
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} already exists and collision action is skip", path.display()),
                )));
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::Other(format!("cannot extract file stem of {}", path.display())))?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().ok_or_else(|| {
                Error::Other(format!("cannot extract parent directory of {}", path.display()))
            })?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(Error::Other(format!(
                "could not find a unique file name for {} after {} attempts",
                path.display(),
                MAX_RENAME_ATTEMPTS
            )))
        }
    }
}

/// Turn a node title into a file name stem that is safe on every platform
///
/// Path separators and characters reserved on Windows become `_`, control
/// characters are dropped, and the result is trimmed and capped in length.
/// An empty result falls back to `fallback` (usually the node id).
///
/// # Examples
///
/// ```
/// use brain_mirror::utils::sanitize_file_name;
///
/// assert_eq!(sanitize_file_name("Q3 / Q4 plans", "id"), "Q3 _ Q4 plans");
/// assert_eq!(sanitize_file_name("  ", "cell-1"), "cell-1");
/// ```
#[must_use]
pub fn sanitize_file_name(title: &str, fallback: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .take(MAX_FILE_STEM_CHARS)
        .collect();

    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
