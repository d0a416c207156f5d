use serde::{Deserialize, Serialize};
use std::path::Path;

/// The `fluxo.lock` lockfile: SHA-256 pins of downloaded tool jars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Lockfile {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolLock>,
}

/// One pinned jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLock {
    /// `group:artifact:version`.
    pub coordinate: String,
    pub sha256: String,
}

impl Lockfile {
    /// Read and parse a `fluxo.lock` from the given path.
    /// Returns an empty lockfile if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, LockfileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| LockfileError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| LockfileError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// The pinned hash for `coordinate`, if any.
    pub fn sha256_for(&self, coordinate: &str) -> Option<&str> {
        self.tools
            .iter()
            .find(|t| t.coordinate == coordinate)
            .map(|t| t.sha256.as_str())
    }

    /// Pin `coordinate` to `sha256`. Returns `true` if the lockfile changed.
    pub fn pin(&mut self, coordinate: &str, sha256: &str) -> bool {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.coordinate == coordinate) {
            if existing.sha256 == sha256 {
                return false;
            }
            existing.sha256 = sha256.to_owned();
            return true;
        }
        self.tools.push(ToolLock {
            coordinate: coordinate.to_owned(),
            sha256: sha256.to_owned(),
        });
        self.tools.sort_by(|a, b| a.coordinate.cmp(&b.coordinate));
        true
    }

    /// Write the lockfile to disk as human-readable TOML.
    ///
    /// Writes to a temp file first and renames it into place so a crash never
    /// leaves a truncated lockfile behind.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), LockfileError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| LockfileError::Serialize { source: e })?;
        let tmp_path = path.with_extension("lock.tmp");
        std::fs::write(&tmp_path, &content).map_err(|e| LockfileError::Write {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| LockfileError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid fluxo.lock at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("cannot serialize lockfile: {source}")]
    Serialize { source: toml::ser::Error },
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}
