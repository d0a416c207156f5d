//! Error types for fluxo-shrinker.

use std::path::PathBuf;

use fluxo_config::CallType;

/// Errors produced by JDK discovery, tool resolution and shrinker invocation.
#[derive(Debug, thiserror::Error)]
pub enum ShrinkerError {
    /// No JDK home configured and `JAVA_HOME` is unset.
    #[error("no JDK configured; set `jdk-home` in fluxo.toml or JAVA_HOME")]
    JdkNotConfigured,

    /// The JDK home does not look like a JDK.
    #[error("invalid JDK home {path}: {reason}")]
    JdkInvalid { path: PathBuf, reason: String },

    /// `java -version` printed something without a version in it.
    #[error("cannot parse java version from output: {output}")]
    JavaVersion { output: String },

    /// A jar the step needs does not exist.
    #[error("{role} jar not found: {path}")]
    MissingJar { role: &'static str, path: PathBuf },

    /// An explicitly configured rule file does not exist.
    #[error("rule file not found: {path}")]
    MissingRuleFile { path: PathBuf },

    /// A classpath source for one call type cannot be used; the next type is tried.
    #[error("{call_type} call unavailable: {reason}")]
    ToolUnavailable { call_type: CallType, reason: String },

    /// Every call type in the fallback order was unavailable.
    #[error("no usable call type for {tool}; tried: {tried}")]
    NoCallTypeAvailable { tool: String, tried: String },

    /// The fallback order was empty.
    #[error("call fallback order is empty")]
    EmptyCallOrder,

    /// The root configuration path was not set on a command.
    #[error("no root configuration specified for {tool}")]
    NoRootConfig { tool: String },

    /// A lock on shared run state was poisoned by a panicking thread.
    #[error("{what} lock poisoned")]
    Poisoned { what: &'static str },

    /// `fluxo.lock` could not be written.
    #[error("{0}")]
    Lockfile(#[from] fluxo_config::lockfile::LockfileError),

    /// An error propagated from fluxo-util (I/O, process, download).
    #[error("{0}")]
    Util(#[from] fluxo_util::error::UtilError),
}

impl ShrinkerError {
    /// Whether the fallback loop may move on to the next call type.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ToolUnavailable { .. })
    }
}
