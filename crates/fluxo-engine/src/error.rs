//! Error types for fluxo-engine.

use std::path::PathBuf;

/// Errors produced by planning, running and verifying chains.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] fluxo_util::error::UtilError),

    /// A manifest operation failed.
    #[error("{0}")]
    Manifest(#[from] fluxo_config::manifest::ManifestError),

    /// A lockfile operation failed.
    #[error("{0}")]
    Lockfile(#[from] fluxo_config::lockfile::LockfileError),

    /// JDK discovery, tool resolution or the shrinker itself failed.
    #[error("{0}")]
    Shrinker(#[from] fluxo_shrinker::ShrinkerError),

    /// `--chain` named a chain the manifest does not declare.
    #[error("no chain named `{chain}` in fluxo.toml (declared: {declared})")]
    UnknownChain { chain: String, declared: String },

    /// The manifest declares no chains.
    #[error("fluxo.toml declares no [[chain]]; nothing to process")]
    NoChains,

    /// An input jar is missing before anything ran.
    #[error("{role} not found: {path}")]
    MissingInput { role: &'static str, path: PathBuf },

    /// Two program jars of one step would be written to the same output.
    #[error(
        "chain `{chain}`, {step}: {first} and {second} would both be written to {output}; \
         rename one of them"
    )]
    OutputCollision {
        chain: String,
        step: String,
        output: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// The tool ran but did not produce the expected jar.
    #[error("{tool} finished but produced no output at {path}")]
    MissingOutput { tool: String, path: PathBuf },

    /// `[api]` is required for this command.
    #[error("fluxo.toml has no [api] section; add `dump = \"<file>.api\"`")]
    NoApiConfig,

    /// A line of the `.api` dump could not be parsed.
    #[error("{path}:{line}: {message}")]
    ApiDump {
        path: String,
        line: usize,
        message: String,
    },

    /// Artifacts were already replaced in this run.
    #[error("outputs already replaced by chain `{chain}`; replacement runs once per run")]
    AlreadyReplaced { chain: String },

    /// The run report or outputs record could not be serialized.
    #[error("cannot write {path}: {message}")]
    Report { path: String, message: String },

    /// One or more chains failed; sibling chains ran to completion.
    #[error("{count} chain(s) failed: {chains}")]
    ChainsFailed { count: usize, chains: String },

    /// Seeds did not match the API dump.
    #[error("seeds of chain `{chain}` do not match the API dump:\n{diff}")]
    VerificationFailed { chain: String, diff: String },

    /// Seeds could not be checked, e.g. because the tool wrote no report.
    #[error("cannot verify seeds of chain `{chain}`: {message}")]
    VerificationError { chain: String, message: String },

    /// No seeds report exists for a chain that is being verified.
    #[error("no seeds report for chain `{chain}` at {path}; run `fluxo shrink` first")]
    NoSeeds { chain: String, path: PathBuf },
}

impl EngineError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
