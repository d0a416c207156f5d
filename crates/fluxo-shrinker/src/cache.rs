//! Run-scoped cache of verified tool classpaths.
//!
//! Loading a classpath means checking every jar exists and fingerprinting it.
//! Chains running in parallel share one cache; the first caller for a given
//! set of jars loads it, the rest reuse the same [`LoadedClasspath`].

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::ShrinkerError;

/// A tool classpath whose jars were verified at load time.
#[derive(Debug)]
pub struct LoadedClasspath {
    /// Deduplication key: hash over every jar's path and content hash.
    pub key: String,
    pub jars: Vec<PathBuf>,
    /// Platform-joined `-cp` value.
    pub classpath: OsString,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Arc<LoadedClasspath>>,
    last_loaded: Option<String>,
    last_cleared: Option<String>,
}

/// Classpath cache owned by one run.
#[derive(Debug, Default)]
pub struct ClasspathCache {
    state: Mutex<CacheState>,
}

impl ClasspathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the loaded classpath for `jars`, loading it on first use.
    ///
    /// Lookup and population happen under one lock, so concurrent callers
    /// never load the same classpath twice.
    ///
    /// # Errors
    /// Returns an error if a jar is missing or cannot be hashed.
    pub fn get_or_load(&self, jars: &[PathBuf]) -> Result<Arc<LoadedClasspath>, ShrinkerError> {
        let mut state = self.state.lock().map_err(|_| ShrinkerError::Poisoned {
            what: "classpath cache",
        })?;

        let key = dedup_key(jars)?;
        if let Some(hit) = state.entries.get(&key) {
            tracing::debug!(key = %short(&key), "classpath cache hit");
            return Ok(Arc::clone(hit));
        }

        let classpath = join_classpath(jars)?;
        let loaded = Arc::new(LoadedClasspath {
            key: key.clone(),
            jars: jars.to_vec(),
            classpath,
        });
        tracing::debug!(key = %short(&key), jars = jars.len(), "classpath loaded");
        state.entries.insert(key.clone(), Arc::clone(&loaded));
        state.last_loaded = Some(key);
        state.last_cleared = None;
        Ok(loaded)
    }

    /// Number of cached classpaths.
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached classpath. Returns how many were released.
    ///
    /// Closing twice without loading in between is a no-op returning 0.
    ///
    /// # Errors
    /// Returns an error if the cache lock was poisoned.
    pub fn close(&self) -> Result<usize, ShrinkerError> {
        let mut state = self.state.lock().map_err(|_| ShrinkerError::Poisoned {
            what: "classpath cache",
        })?;
        if state.last_loaded == state.last_cleared {
            return Ok(0);
        }
        let released = state.entries.len();
        state.entries.clear();
        state.last_cleared = state.last_loaded.clone();
        tracing::debug!(released, "classpath cache closed");
        Ok(released)
    }
}

fn dedup_key(jars: &[PathBuf]) -> Result<String, ShrinkerError> {
    let mut parts = Vec::with_capacity(jars.len() * 2);
    for jar in jars {
        if !jar.is_file() {
            return Err(ShrinkerError::MissingJar {
                role: "tool",
                path: jar.clone(),
            });
        }
        parts.push(jar.display().to_string());
        parts.push(fluxo_util::hash::sha256_file(jar)?);
    }
    let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
    Ok(fluxo_util::hash::sha256_multi(&refs))
}

/// Join jars into a `-cp` value with the platform separator.
///
/// # Errors
/// Returns an error if a path contains the separator itself.
pub fn join_classpath(jars: &[PathBuf]) -> Result<OsString, ShrinkerError> {
    std::env::join_paths(jars).map_err(|e| {
        ShrinkerError::Util(fluxo_util::error::UtilError::io(
            jars.first().map_or_else(|| std::path::Path::new(""), |p| p.as_path()),
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
        ))
    })
}

fn short(key: &str) -> &str {
    key.get(..12).unwrap_or(key)
}
