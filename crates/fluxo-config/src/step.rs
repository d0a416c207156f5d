//! Shrinker step configuration and chain assembly.
//!
//! A chain is an immutable, ordered list of [`StepConfig`]s. It is either
//! declared inline or linked through `next` references in the manifest; the
//! linked form is flattened here so nothing downstream ever walks pointers.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::manifest::ManifestError;

/// Which bytecode shrinker runs a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShrinkerKind {
    #[serde(rename = "proguard")]
    ProGuard,
    R8,
}

impl ShrinkerKind {
    /// Lowercase name used in directory and log file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProGuard => "proguard",
            Self::R8 => "r8",
        }
    }
}

impl fmt::Display for ShrinkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ProGuard => "ProGuard",
            Self::R8 => "R8",
        })
    }
}

/// How the shrinker binary is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallType {
    /// Managed tool-store jars resolved from Maven coordinates.
    Bundled,
    /// Configured jars through the run's classpath cache, output kept in memory.
    InMemory,
    /// Configured jars in a fresh `java` process, output streamed to log files.
    External,
}

impl CallType {
    pub const DEFAULT_ORDER: [CallType; 3] = [Self::External, Self::Bundled, Self::InMemory];

    fn default_order() -> Vec<CallType> {
        Self::DEFAULT_ORDER.to_vec()
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bundled => "bundled",
            Self::InMemory => "in-memory",
            Self::External => "external",
        })
    }
}

fn default_true() -> bool {
    true
}

/// Configuration of one shrinker invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepConfig {
    pub shrinker: ShrinkerKind,
    #[serde(default = "default_true")]
    pub optimize: bool,
    #[serde(default)]
    pub obfuscate: bool,
    #[serde(default = "default_true")]
    pub obfuscate_incrementally: bool,
    /// R8 only: run without `--pg-compat`.
    #[serde(default)]
    pub full_mode: bool,
    /// Rule files. Empty means "use the well-known files that exist".
    #[serde(default)]
    pub configuration_files: Vec<PathBuf>,
    /// `-Xmx` value for the external process, e.g. `"2g"`.
    #[serde(default)]
    pub max_heap_size: Option<String>,
    #[serde(default = "CallType::default_order")]
    pub call_fallback_order: Vec<CallType>,
}

impl StepConfig {
    /// A step with every option at its default.
    pub fn new(shrinker: ShrinkerKind) -> Self {
        Self {
            shrinker,
            optimize: true,
            obfuscate: false,
            obfuscate_incrementally: true,
            full_mode: false,
            configuration_files: Vec::new(),
            max_heap_size: None,
            call_fallback_order: CallType::default_order(),
        }
    }

    pub fn optimize(mut self, enabled: bool) -> Self {
        self.optimize = enabled;
        self
    }

    pub fn obfuscate(mut self, enabled: bool) -> Self {
        self.obfuscate = enabled;
        self
    }

    pub fn obfuscate_incrementally(mut self, enabled: bool) -> Self {
        self.obfuscate_incrementally = enabled;
        self
    }

    pub fn full_mode(mut self, enabled: bool) -> Self {
        self.full_mode = enabled;
        self
    }

    pub fn configuration_files(mut self, files: &[PathBuf]) -> Self {
        self.configuration_files = files.to_vec();
        self
    }

    pub fn max_heap_size(mut self, size: &str) -> Self {
        self.max_heap_size = Some(size.to_owned());
        self
    }

    pub fn call_fallback_order(mut self, order: &[CallType]) -> Self {
        self.call_fallback_order = order.to_vec();
        self
    }

    /// Check the invariants a step must hold before planning.
    ///
    /// # Errors
    /// Returns `ManifestError::InvalidStep` naming the offending field.
    pub fn validate(&self, chain: &str, index: usize) -> Result<(), ManifestError> {
        let invalid = |reason: String| ManifestError::InvalidStep {
            chain: chain.to_owned(),
            index,
            reason,
        };

        if self.call_fallback_order.is_empty() {
            return Err(invalid("call-fallback-order must not be empty".to_owned()));
        }
        let mut seen = HashSet::new();
        for call in &self.call_fallback_order {
            if !seen.insert(*call) {
                return Err(invalid(format!(
                    "call-fallback-order lists `{call}` more than once"
                )));
            }
        }

        if let Some(heap) = &self.max_heap_size {
            if !is_valid_heap_size(heap) {
                return Err(invalid(format!(
                    "max-heap-size `{heap}` is not a JVM size (expected e.g. 512m or 2g)"
                )));
            }
        }
        Ok(())
    }
}

/// Accepts the `-Xmx` size syntax: digits with an optional k/m/g/t suffix.
fn is_valid_heap_size(size: &str) -> bool {
    let digits = size.trim_end_matches(['k', 'K', 'm', 'M', 'g', 'G', 't', 'T']);
    let suffix_len = size.len().saturating_sub(digits.len());
    !digits.is_empty() && suffix_len <= 1 && digits.chars().all(|c| c.is_ascii_digit())
}

/// A step declared in the linked `[steps.<id>]` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinkedStep {
    #[serde(flatten)]
    pub step: StepConfig,
    #[serde(default)]
    pub next: Option<String>,
}

/// A fully assembled, immutable chain of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub id: String,
    pub replace_outputs: bool,
    steps: Vec<StepConfig>,
}

impl ChainConfig {
    /// Start assembling a chain.
    pub fn builder(id: &str) -> ChainConfigBuilder {
        ChainConfigBuilder {
            id: id.to_owned(),
            replace_outputs: true,
            steps: Vec::new(),
        }
    }

    /// Steps in execution order. Never empty.
    pub fn steps(&self) -> &[StepConfig] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Builder producing a validated [`ChainConfig`].
#[derive(Debug)]
pub struct ChainConfigBuilder {
    id: String,
    replace_outputs: bool,
    steps: Vec<StepConfig>,
}

impl ChainConfigBuilder {
    /// Append a step to the end of the chain.
    pub fn then(mut self, step: StepConfig) -> Self {
        self.steps.push(step);
        self
    }

    pub fn replace_outputs(mut self, enabled: bool) -> Self {
        self.replace_outputs = enabled;
        self
    }

    /// Freeze the chain.
    ///
    /// # Errors
    /// Returns an error if the chain has no steps or a step is invalid.
    pub fn build(self) -> Result<ChainConfig, ManifestError> {
        if self.steps.is_empty() {
            return Err(ManifestError::EmptyChain { chain: self.id });
        }
        for (index, step) in self.steps.iter().enumerate() {
            step.validate(&self.id, index)?;
        }
        Ok(ChainConfig {
            id: self.id,
            replace_outputs: self.replace_outputs,
            steps: self.steps,
        })
    }
}

/// Flatten a linked chain starting at `head` into an ordered list.
///
/// # Errors
/// Returns `UnknownStep` for a dangling reference and `ChainCycle` when a step
/// is reached twice (including a step pointing at itself).
pub fn link_steps(
    chain: &str,
    head: &str,
    steps: &BTreeMap<String, LinkedStep>,
) -> Result<Vec<StepConfig>, ManifestError> {
    let mut ordered = Vec::new();
    let mut visited = BTreeSet::new();
    let mut cursor = Some(head.to_owned());

    while let Some(id) = cursor {
        if !visited.insert(id.clone()) {
            return Err(ManifestError::ChainCycle {
                chain: chain.to_owned(),
                step: id,
            });
        }
        let linked = steps.get(&id).ok_or_else(|| ManifestError::UnknownStep {
            chain: chain.to_owned(),
            step: id.clone(),
        })?;
        ordered.push(linked.step.clone());
        cursor = linked.next.clone();
    }

    Ok(ordered)
}
