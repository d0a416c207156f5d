//! Error types for fluxo-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A glob pattern was invalid.
    #[error("invalid glob pattern `{pattern}`: {message}")]
    GlobPattern { pattern: String, message: String },

    /// A command could not be spawned at all.
    #[error("cannot execute `{program}`: {source}")]
    CommandExec {
        program: String,
        source: std::io::Error,
    },

    /// A command ran and exited with a non-zero code.
    #[error(
        "command failed with exit code {exit_code}\n  command: {command}\n  working dir: {working_dir}\n  stdout log: {stdout_log}\n  stderr log: {stderr_log}"
    )]
    CommandFailed {
        command: String,
        working_dir: String,
        exit_code: i32,
        stdout_log: String,
        stderr_log: String,
    },

    /// A command was terminated by a signal before it could exit.
    #[error(
        "command was terminated by a signal\n  command: {command}\n  working dir: {working_dir}\n  stdout log: {stdout_log}\n  stderr log: {stderr_log}"
    )]
    CommandKilled {
        command: String,
        working_dir: String,
        stdout_log: String,
        stderr_log: String,
    },

    /// A download failed.
    #[error("download failed: {message}")]
    Download { message: String },

    /// A Maven coordinate string is malformed.
    #[error("invalid Maven coordinate \"{coordinate}\": {reason}")]
    InvalidMavenCoordinate { coordinate: String, reason: String },

    /// A version string contains unsafe characters.
    #[error("invalid version \"{version}\": only alphanumeric characters, dots, hyphens, and underscores are allowed")]
    InvalidVersion { version: String },

    /// An artifact hash does not match the expected value.
    #[error("artifact hash mismatch for {path}: expected {expected}, got {actual}")]
    ArtifactHashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Cannot determine the user's home directory.
    #[error("cannot determine home directory; set FLUXO_HOME or HOME")]
    NoHomeDir,
}

impl UtilError {
    /// Shorthand for wrapping an `std::io::Error` together with the path it concerns.
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
