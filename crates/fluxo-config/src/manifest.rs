//! `fluxo.toml`: project inputs, tool overrides, chains and steps.
//!
//! Relative paths are kept as written; callers resolve them against the
//! project directory.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::step::{link_steps, ChainConfig, LinkedStep, ShrinkerKind, StepConfig};

/// The `fluxo.toml` project manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Manifest {
    pub project: Project,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default, rename = "chain")]
    pub chains: Vec<ChainDecl>,
    /// Steps addressable by id for linked chains.
    #[serde(default)]
    pub steps: BTreeMap<String, LinkedStep>,
    #[serde(default)]
    pub api: Option<ApiConfig>,
    #[serde(default, rename = "artifact")]
    pub artifacts: Vec<ArtifactDecl>,
    #[serde(default)]
    pub packaging: Option<Packaging>,
}

/// Whether the project is consumed as a dependency or run as a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    #[default]
    Library,
    Application,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub kind: ProjectKind,
    /// The project's own compiled jar.
    pub main_jar: PathBuf,
    /// Extra program jars processed alongside the main jar.
    #[serde(default)]
    pub input_jars: Vec<PathBuf>,
    /// Compile classpath visible to the shrinker but never rewritten.
    #[serde(default)]
    pub library_jars: Vec<PathBuf>,
    #[serde(default)]
    pub main_class: Option<String>,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default)]
    pub jdk_home: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub filter_multi_release: bool,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_true() -> bool {
    true
}

/// Per-shrinker overrides of the tool distribution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Tools {
    #[serde(default)]
    pub proguard: Option<ToolConfig>,
    #[serde(default)]
    pub r8: Option<ToolConfig>,
}

impl Tools {
    pub fn for_kind(&self, kind: ShrinkerKind) -> Option<&ToolConfig> {
        match kind {
            ShrinkerKind::ProGuard => self.proguard.as_ref(),
            ShrinkerKind::R8 => self.r8.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolConfig {
    /// `group:artifact:version` triples replacing the built-in defaults.
    #[serde(default)]
    pub coordinates: Vec<String>,
    /// Local jars for the `external` and `in-memory` call types.
    #[serde(default)]
    pub jars: Vec<PathBuf>,
}

impl ToolConfig {
    /// A copy with relative `jars` joined onto `project_dir`.
    pub fn resolved(&self, project_dir: &Path) -> Self {
        Self {
            coordinates: self.coordinates.clone(),
            jars: self
                .jars
                .iter()
                .map(|j| {
                    if j.is_absolute() {
                        j.clone()
                    } else {
                        project_dir.join(j)
                    }
                })
                .collect(),
        }
    }
}

/// A `[[chain]]` entry: either inline `steps` or a linked `head`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainDecl {
    pub id: String,
    #[serde(default = "default_true")]
    pub replace_outputs: bool,
    #[serde(default)]
    pub steps: Option<Vec<StepConfig>>,
    #[serde(default)]
    pub head: Option<String>,
}

/// What to do with the API dump's keep rules on a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepRulesMode {
    #[default]
    Disabled,
    /// Generate rules and add them to every step of every chain.
    BeforeChain,
    /// Generate rules only; chains are not processed.
    Standalone,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Binary-compatibility `.api` dump of the public surface.
    pub dump: PathBuf,
    #[serde(default)]
    pub keep_rules: KeepRulesMode,
    #[serde(default)]
    pub verify: bool,
}

/// An output artifact the orchestrator is about to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArtifactDecl {
    pub name: String,
    #[serde(rename = "type", default = "default_jar")]
    pub kind: String,
    #[serde(default = "default_jar")]
    pub extension: String,
    #[serde(default)]
    pub classifier: Option<String>,
    pub file: PathBuf,
}

fn default_jar() -> String {
    "jar".to_owned()
}

/// Platform packaging step of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Packaging {
    pub main_jar: PathBuf,
    pub destination_dir: PathBuf,
}

impl Manifest {
    /// Read and parse a `fluxo.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    /// Parse manifest text; `origin` is only used in error messages.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid manifest.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ManifestError> {
        toml::from_str(content).map_err(|e| ManifestError::Parse {
            path: origin.display().to_string(),
            source: e,
        })
    }

    /// Assemble every declared chain into its immutable ordered form.
    ///
    /// All chains are validated before anything runs, so a broken chain is
    /// reported even when only a different one was requested.
    ///
    /// # Errors
    /// Returns an error for duplicate chain ids, chains declaring both or
    /// neither of `steps`/`head`, dangling or cyclic links, and invalid steps.
    pub fn resolve_chains(&self) -> Result<Vec<ChainConfig>, ManifestError> {
        let mut ids = BTreeSet::new();
        let mut chains = Vec::with_capacity(self.chains.len());

        for decl in &self.chains {
            if !ids.insert(decl.id.as_str()) {
                return Err(ManifestError::DuplicateChain {
                    chain: decl.id.clone(),
                });
            }

            let steps = match (&decl.steps, &decl.head) {
                (Some(steps), None) => steps.clone(),
                (None, Some(head)) => link_steps(&decl.id, head, &self.steps)?,
                _ => {
                    return Err(ManifestError::AmbiguousChain {
                        chain: decl.id.clone(),
                    })
                }
            };

            let chain = steps
                .into_iter()
                .fold(ChainConfig::builder(&decl.id), |b, step| b.then(step))
                .replace_outputs(decl.replace_outputs)
                .build()?;
            chains.push(chain);
        }

        Ok(chains)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid fluxo.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("chain `{chain}` is declared more than once")]
    DuplicateChain { chain: String },
    #[error("chain `{chain}` must declare exactly one of `steps` or `head`")]
    AmbiguousChain { chain: String },
    #[error("chain `{chain}` has no steps; empty chains cannot be planned")]
    EmptyChain { chain: String },
    #[error("chain `{chain}` references unknown step `{step}`")]
    UnknownStep { chain: String, step: String },
    #[error("chain `{chain}` contains a cycle: step `{step}` is reached twice")]
    ChainCycle { chain: String, step: String },
    #[error("chain `{chain}` step {index}: {reason}")]
    InvalidStep {
        chain: String,
        index: usize,
        reason: String,
    },
}
