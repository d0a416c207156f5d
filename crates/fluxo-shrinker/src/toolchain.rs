//! Managed tool store and resolution of shrinker classpaths.
//!
//! Bundled tool jars are downloaded from their Maven repository into
//! `~/.fluxo/tools/<group-path>/<artifact>/<version>/` and pinned by SHA-256
//! in `fluxo.lock`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fluxo_config::manifest::ToolConfig;
use fluxo_config::{CallType, Lockfile};
use fluxo_util::error::UtilError;
use fluxo_util::maven::MavenCoordinate;

use crate::error::ShrinkerError;
use crate::strategy::ShrinkerStrategy;

/// Return the root directory of the managed tool store: `~/.fluxo/tools/`.
///
/// # Errors
/// Returns an error if the home directory cannot be determined.
pub fn tools_dir() -> Result<PathBuf, ShrinkerError> {
    Ok(fluxo_util::fs::fluxo_home()?.join("tools"))
}

#[derive(Debug)]
struct LockState {
    lockfile: Lockfile,
    changed: bool,
}

/// Resolves classpath sources for each call type.
///
/// Shared by every chain of a run. The lockfile is updated in memory as new
/// jars are pinned; the caller persists it with [`ToolResolver::save_lockfile`].
#[derive(Debug)]
pub struct ToolResolver {
    store: PathBuf,
    locked: bool,
    lock: Mutex<LockState>,
}

impl ToolResolver {
    /// `locked` forbids downloads and requires every bundled jar to be pinned.
    pub fn new(store: &Path, lockfile: Lockfile, locked: bool) -> Self {
        Self {
            store: store.to_path_buf(),
            locked,
            lock: Mutex::new(LockState {
                lockfile,
                changed: false,
            }),
        }
    }

    pub fn store(&self) -> &Path {
        &self.store
    }

    /// Coordinates the bundled call uses for `strategy`, honoring overrides.
    ///
    /// # Errors
    /// Returns an error if a coordinate is malformed.
    pub fn coordinates(
        strategy: &dyn ShrinkerStrategy,
        overrides: Option<&ToolConfig>,
    ) -> Result<Vec<MavenCoordinate>, ShrinkerError> {
        let configured = overrides.map(|t| t.coordinates.as_slice()).unwrap_or_default();
        if configured.is_empty() {
            strategy
                .default_coordinates()
                .iter()
                .map(|c| Ok(MavenCoordinate::parse(c)?))
                .collect()
        } else {
            configured
                .iter()
                .map(|c| Ok(MavenCoordinate::parse(c)?))
                .collect()
        }
    }

    /// Jars for `call_type`.
    ///
    /// # Errors
    /// Returns `ToolUnavailable` when the source cannot serve this call type
    /// (nothing configured, download refused or failed), and other errors for
    /// hard failures such as a hash mismatch.
    pub fn jars_for(
        &self,
        call_type: CallType,
        strategy: &dyn ShrinkerStrategy,
        overrides: Option<&ToolConfig>,
    ) -> Result<Vec<PathBuf>, ShrinkerError> {
        match call_type {
            CallType::External | CallType::InMemory => local_jars(call_type, strategy, overrides),
            CallType::Bundled => {
                let coords = Self::coordinates(strategy, overrides)?;
                coords
                    .iter()
                    .map(|c| self.ensure_bundled(c, strategy.repository()))
                    .collect()
            }
        }
    }

    fn ensure_bundled(
        &self,
        coord: &MavenCoordinate,
        repository: &str,
    ) -> Result<PathBuf, ShrinkerError> {
        let key = coord.to_string();
        let dest = coord.store_path(&self.store);
        let pinned = {
            let state = self.state()?;
            state.lockfile.sha256_for(&key).map(str::to_owned)
        };

        if self.locked {
            if pinned.is_none() {
                return Err(unavailable(format!(
                    "{key} is not pinned in fluxo.lock and --locked forbids resolving it"
                )));
            }
            if !dest.is_file() {
                return Err(unavailable(format!(
                    "{key} is not in the tool store and --locked forbids downloading it"
                )));
            }
        }

        let url = coord.to_url(repository);
        let result = match fluxo_util::artifact::ensure_artifact(&url, &dest, pinned.as_deref()) {
            Ok(r) => r,
            Err(UtilError::Download { message }) => return Err(unavailable(message)),
            Err(e) => return Err(e.into()),
        };

        if result.freshly_downloaded {
            eprintln!("    Downloaded {key}");
        }
        if pinned.is_none() {
            let mut state = self.state()?;
            if state.lockfile.pin(&key, &result.sha256) {
                state.changed = true;
            }
        }
        Ok(result.path)
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, LockState>, ShrinkerError> {
        self.lock
            .lock()
            .map_err(|_| ShrinkerError::Poisoned { what: "lockfile" })
    }

    /// Write the lockfile back if new pins were added. Returns whether it was written.
    ///
    /// # Errors
    /// Returns an error if the lockfile cannot be written.
    pub fn save_lockfile(&self, path: &Path) -> Result<bool, ShrinkerError> {
        let mut state = self.state()?;
        if !state.changed {
            return Ok(false);
        }
        state.lockfile.write_to(path)?;
        state.changed = false;
        Ok(true)
    }

    /// A copy of the current lockfile contents.
    ///
    /// # Errors
    /// Returns an error if the lock was poisoned.
    pub fn lockfile(&self) -> Result<Lockfile, ShrinkerError> {
        Ok(self.state()?.lockfile.clone())
    }
}

fn unavailable(reason: String) -> ShrinkerError {
    ShrinkerError::ToolUnavailable {
        call_type: CallType::Bundled,
        reason,
    }
}

fn local_jars(
    call_type: CallType,
    strategy: &dyn ShrinkerStrategy,
    overrides: Option<&ToolConfig>,
) -> Result<Vec<PathBuf>, ShrinkerError> {
    let jars = overrides.map(|t| t.jars.clone()).unwrap_or_default();
    if jars.is_empty() {
        return Err(ShrinkerError::ToolUnavailable {
            call_type,
            reason: format!("no local jars configured under [tools.{}]", strategy.kind().as_str()),
        });
    }
    if let Some(missing) = jars.iter().find(|j| !j.is_file()) {
        return Err(ShrinkerError::ToolUnavailable {
            call_type,
            reason: format!("configured jar {} does not exist", missing.display()),
        });
    }
    Ok(jars)
}
