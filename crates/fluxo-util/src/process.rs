//! Process execution helpers: in-memory capture and log-file capture.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use crate::error::UtilError;

/// Structured output from a command execution.
#[derive(Debug)]
pub struct CommandOutput {
    /// Standard output as a string.
    pub stdout: String,
    /// Standard error as a string.
    pub stderr: String,
    /// Whether the command exited successfully.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
}

/// Execute a command and capture its output in memory.
///
/// # Errors
/// Returns an error if the command cannot be spawned (e.g. binary not found).
/// A non-zero exit code is **not** an error; check `CommandOutput::success` instead.
pub fn run_command(cmd: &mut Command) -> Result<CommandOutput, UtilError> {
    let output = cmd.output().map_err(|source| UtilError::CommandExec {
        program: cmd.get_program().to_string_lossy().into_owned(),
        source,
    })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
    })
}

/// Pair of log files receiving a tool's stdout and stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFiles {
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

impl LogFiles {
    /// `<logs_dir>/<tool>-<timestamp>-out.txt` and `-err.txt`.
    pub fn timestamped(logs_dir: &Path, tool: &str) -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S-%3f");
        Self {
            stdout: logs_dir.join(format!("{tool}-{stamp}-out.txt")),
            stderr: logs_dir.join(format!("{tool}-{stamp}-err.txt")),
        }
    }

    /// Persist output that was captured in memory, so it outlives the run.
    ///
    /// # Errors
    /// Returns an error if either file cannot be written.
    pub fn write_captured(&self, stdout: &str, stderr: &str) -> Result<(), UtilError> {
        for (path, content) in [(&self.stdout, stdout), (&self.stderr, stderr)] {
            if let Some(parent) = path.parent() {
                crate::fs::ensure_dir(parent)?;
            }
            std::fs::write(path, content).map_err(|source| UtilError::io(path, source))?;
        }
        Ok(())
    }

    fn remove(&self) -> Result<(), UtilError> {
        crate::fs::remove_file_if_exists(&self.stdout)?;
        crate::fs::remove_file_if_exists(&self.stderr)
    }
}

/// Result of a command whose output went to log files.
#[derive(Debug)]
pub struct LoggedRun {
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
    /// Whether the log files are still on disk (they are removed on success).
    pub logs_kept: bool,
}

/// Render a command the way a user would type it, for error messages.
pub fn render_command(cmd: &Command) -> String {
    let mut parts = vec![quote_arg(&cmd.get_program().to_string_lossy())];
    parts.extend(cmd.get_args().map(|a| quote_arg(&a.to_string_lossy())));
    parts.join(" ")
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains(char::is_whitespace) {
        format!("\"{arg}\"")
    } else {
        arg.to_owned()
    }
}

/// Working directory a command will run in, for error messages.
pub fn working_dir(cmd: &Command) -> String {
    cmd.get_current_dir()
        .map(Path::to_path_buf)
        .or_else(|| std::env::current_dir().ok())
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// Build the error describing a failed command with its evidence files.
pub fn failure_error(cmd: &Command, status: Option<i32>, logs: &LogFiles) -> UtilError {
    let command = render_command(cmd);
    let working_dir = working_dir(cmd);
    let stdout_log = logs.stdout.display().to_string();
    let stderr_log = logs.stderr.display().to_string();
    match status {
        Some(exit_code) => UtilError::CommandFailed {
            command,
            working_dir,
            exit_code,
            stdout_log,
            stderr_log,
        },
        None => UtilError::CommandKilled {
            command,
            working_dir,
            stdout_log,
            stderr_log,
        },
    }
}

/// Run a command with stdout/stderr streamed into `logs`.
///
/// On success the log files are deleted. On failure they are kept, and when
/// `check_exit` is set a `CommandFailed` error pointing at them is returned.
/// With `check_exit` unset a failing exit is reported through `LoggedRun`.
///
/// # Errors
/// Returns an error if the log files cannot be created, the command cannot be
/// spawned, or (with `check_exit`) the command exits unsuccessfully.
pub fn run_logged(
    cmd: &mut Command,
    logs: &LogFiles,
    check_exit: bool,
) -> Result<LoggedRun, UtilError> {
    let out = create_log(&logs.stdout)?;
    let err = create_log(&logs.stderr)?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err));

    tracing::debug!(command = %render_command(cmd), "spawning");
    let status: ExitStatus = match cmd.status() {
        Ok(status) => status,
        Err(source) => {
            // Nothing ran, so the logs are empty.
            logs.remove()?;
            return Err(UtilError::CommandExec {
                program: cmd.get_program().to_string_lossy().into_owned(),
                source,
            });
        }
    };

    if status.success() {
        logs.remove()?;
        return Ok(LoggedRun {
            exit_code: status.code(),
            logs_kept: false,
        });
    }

    if check_exit {
        return Err(failure_error(cmd, status.code(), logs));
    }

    tracing::warn!(
        exit_code = ?status.code(),
        stdout_log = %logs.stdout.display(),
        stderr_log = %logs.stderr.display(),
        "command failed, exit code check disabled"
    );
    Ok(LoggedRun {
        exit_code: status.code(),
        logs_kept: true,
    })
}

fn create_log(path: &Path) -> Result<File, UtilError> {
    if let Some(parent) = path.parent() {
        crate::fs::ensure_dir(parent)?;
    }
    File::create(path).map_err(|source| UtilError::io(path, source))
}
