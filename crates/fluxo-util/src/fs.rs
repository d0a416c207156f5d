//! Filesystem utilities for fluxo.

use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::io(path, source))
}

/// Empty `path` and recreate it.
///
/// Shrinker steps call this before writing anything so that a half-written jar
/// from a cancelled run can never be mistaken for a fresh output.
///
/// # Errors
/// Returns an error if the directory cannot be removed or recreated.
pub fn clear_dir(path: &Path) -> Result<(), UtilError> {
    remove_dir_all_if_exists(path)?;
    ensure_dir(path)
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::io(path, source)),
    }
}

/// Remove a single file. No error if it is already gone.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::io(path, source)),
    }
}

/// Return the fluxo home directory.
///
/// `FLUXO_HOME` wins when set; otherwise `~/.fluxo` resolved via `HOME`
/// (Unix) or `USERPROFILE` (Windows).
///
/// # Errors
/// Returns an error if none of the variables is set.
pub fn fluxo_home() -> Result<PathBuf, UtilError> {
    if let Ok(explicit) = std::env::var("FLUXO_HOME") {
        if !explicit.is_empty() {
            return Ok(PathBuf::from(explicit));
        }
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .map_err(|_| UtilError::NoHomeDir)?;
    Ok(home.join(".fluxo"))
}

/// Collect all files with the given `extension` under `dir`, recursively, sorted by path.
///
/// # Errors
/// Returns an error if `dir` cannot be read.
pub fn collect_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, UtilError> {
    let mut files = Vec::new();
    collect_files_recursive(dir, extension, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files_recursive(
    dir: &Path,
    extension: &str,
    out: &mut Vec<PathBuf>,
) -> Result<(), UtilError> {
    let entries = std::fs::read_dir(dir).map_err(|source| UtilError::io(dir, source))?;

    for entry in entries {
        let entry = entry.map_err(|source| UtilError::io(dir, source))?;
        let path = entry.path();

        if path.is_dir() {
            collect_files_recursive(&path, extension, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == extension)
        {
            out.push(path);
        }
    }

    Ok(())
}

/// Match `pattern` relative to `dir` (or absolute) and return the matching
/// files, sorted.
///
/// # Errors
/// Returns an error if the pattern is not a valid glob.
pub fn glob_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, UtilError> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_owned()
    } else {
        dir.join(pattern).display().to_string()
    };
    let mut paths: Vec<PathBuf> = glob::glob(&full_pattern)
        .map_err(|e| UtilError::GlobPattern {
            pattern: full_pattern.clone(),
            message: e.to_string(),
        })?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Sum of the sizes of all regular files under `dir`, recursively.
///
/// A missing directory counts as zero bytes.
///
/// # Errors
/// Returns an error if an existing directory or file cannot be read.
pub fn dir_size(dir: &Path) -> Result<u64, UtilError> {
    if !dir.exists() {
        return Ok(0);
    }
    let entries = std::fs::read_dir(dir).map_err(|source| UtilError::io(dir, source))?;
    let mut total: u64 = 0;
    for entry in entries {
        let entry = entry.map_err(|source| UtilError::io(dir, source))?;
        let path = entry.path();
        let size = if path.is_dir() {
            dir_size(&path)?
        } else {
            file_size(&path)?
        };
        total = total.saturating_add(size);
    }
    Ok(total)
}

/// Sum of the sizes of the given files.
///
/// # Errors
/// Returns an error if any file's metadata cannot be read.
pub fn files_size(paths: &[PathBuf]) -> Result<u64, UtilError> {
    paths
        .iter()
        .try_fold(0u64, |acc, p| Ok(acc.saturating_add(file_size(p)?)))
}

fn file_size(path: &Path) -> Result<u64, UtilError> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| UtilError::io(path, source))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b").join("c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn clear_dir_drops_stale_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("half-written.jar"), b"PK").unwrap();

        clear_dir(&out).unwrap();
        assert!(out.is_dir());
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn clear_dir_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("fresh");
        clear_dir(&out).unwrap();
        assert!(out.is_dir());
    }

    #[test]
    fn remove_dir_all_if_exists_absent_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        remove_dir_all_if_exists(&tmp.path().join("nonexistent")).unwrap();
    }

    #[test]
    fn remove_file_if_exists_absent_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        remove_file_if_exists(&tmp.path().join("gone.txt")).unwrap();
    }

    #[test]
    fn collect_files_finds_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("libs");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("b.jar"), b"").unwrap();
        fs::write(sub.join("a.jar"), b"").unwrap();
        fs::write(tmp.path().join("c.jar"), b"").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"").unwrap();

        let files = collect_files(tmp.path(), "jar").unwrap();
        assert_eq!(files.len(), 3);
        let mut sorted = files.clone();
        sorted.sort();
        assert_eq!(files, sorted);
    }

    #[test]
    fn glob_files_matches_pattern() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("java.base.jmod"), b"").unwrap();
        fs::write(tmp.path().join("java.sql.jmod"), b"").unwrap();
        fs::write(tmp.path().join("README"), b"").unwrap();

        let files = glob_files(tmp.path(), "*.jmod").unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.first().unwrap().ends_with("java.base.jmod"));
    }

    #[test]
    fn dir_size_sums_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("a.jar"), vec![0u8; 300]).unwrap();
        fs::write(tmp.path().join("nested").join("b.jar"), vec![0u8; 200]).unwrap();

        assert_eq!(dir_size(tmp.path()).unwrap(), 500);
    }

    #[test]
    fn dir_size_missing_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(dir_size(&tmp.path().join("missing")).unwrap(), 0);
    }

    #[test]
    fn files_size_sums_listed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.jar");
        let b = tmp.path().join("b.jar");
        fs::write(&a, vec![1u8; 10]).unwrap();
        fs::write(&b, vec![1u8; 15]).unwrap();
        assert_eq!(files_size(&[a, b]).unwrap(), 25);
    }
}
