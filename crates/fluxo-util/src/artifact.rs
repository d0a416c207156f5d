//! Verified, atomic placement of downloaded tool jars.

use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Result of ensuring an artifact is available locally.
#[derive(Debug, Clone)]
pub struct ArtifactResult {
    /// Path to the artifact on disk.
    pub path: PathBuf,
    /// Hex-encoded SHA-256 hash of the artifact.
    pub sha256: String,
    /// `true` if the artifact was downloaded this call.
    pub freshly_downloaded: bool,
}

/// Validate that a version string is safe for filesystem paths and URLs.
///
/// Allows only `[a-zA-Z0-9._-]`. Must be non-empty.
///
/// # Errors
/// Returns `UtilError::InvalidVersion` if the string is empty or contains
/// characters outside the allowed set.
pub fn validate_version(version: &str) -> Result<(), UtilError> {
    if version.is_empty()
        || !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    {
        return Err(UtilError::InvalidVersion {
            version: version.to_owned(),
        });
    }
    Ok(())
}

fn check_hash(dest: &Path, expected: Option<&str>, actual: &str) -> Result<(), UtilError> {
    match expected {
        Some(expected) if expected != actual => Err(UtilError::ArtifactHashMismatch {
            path: dest.display().to_string(),
            expected: expected.to_owned(),
            actual: actual.to_owned(),
        }),
        _ => Ok(()),
    }
}

/// Ensure the file at `dest` exists, downloading it from `url` when missing.
///
/// An existing file is hashed and checked against `expected_sha256`. A new
/// download goes to a temp file next to `dest`, is verified, then renamed into
/// place. If another process wins the rename race, its file is verified
/// instead. The temp file is removed on every error path.
///
/// # Errors
/// Returns an error if the download fails, the hash does not match, or an
/// I/O operation fails.
pub fn ensure_artifact(
    url: &str,
    dest: &Path,
    expected_sha256: Option<&str>,
) -> Result<ArtifactResult, UtilError> {
    if dest.exists() {
        let actual = crate::hash::sha256_file(dest)?;
        check_hash(dest, expected_sha256, &actual)?;
        return Ok(ArtifactResult {
            path: dest.to_path_buf(),
            sha256: actual,
            freshly_downloaded: false,
        });
    }

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    crate::fs::ensure_dir(parent)?;

    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!(".tmp-{}-{file_name}", std::process::id()));

    let downloaded = match crate::download::download(url, &tmp_path) {
        Ok(hash) => hash,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    if let Err(e) = check_hash(dest, expected_sha256, &downloaded) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }

    match std::fs::rename(&tmp_path, dest) {
        Ok(()) => {}
        Err(_) if dest.exists() => {
            let _ = std::fs::remove_file(&tmp_path);
            if expected_sha256.is_some() {
                let placed = crate::hash::sha256_file(dest)?;
                check_hash(dest, expected_sha256, &placed)?;
            }
        }
        Err(source) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(UtilError::io(dest, source));
        }
    }

    Ok(ArtifactResult {
        path: dest.to_path_buf(),
        sha256: downloaded,
        freshly_downloaded: true,
    })
}
