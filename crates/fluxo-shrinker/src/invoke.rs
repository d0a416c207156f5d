//! Shrinker process invocation with call-type fallback.

use std::path::{Path, PathBuf};
use std::process::Command;

use fluxo_config::manifest::ToolConfig;
use fluxo_config::CallType;
use fluxo_util::process::{self, LogFiles};

use crate::cache::{join_classpath, ClasspathCache};
use crate::error::ShrinkerError;
use crate::jdk::JdkInfo;
use crate::strategy::{ShrinkerStrategy, ToolArgs};
use crate::toolchain::ToolResolver;

/// Run-wide collaborators every invocation needs.
#[derive(Debug, Clone, Copy)]
pub struct InvokeContext<'a> {
    pub jdk: &'a JdkInfo,
    pub resolver: &'a ToolResolver,
    pub cache: &'a ClasspathCache,
}

/// Outcome of one shrinker invocation.
#[derive(Debug)]
pub struct InvokeResult {
    /// The call type that actually ran the tool.
    pub call_type: CallType,
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Log files left on disk; `None` when the tool succeeded.
    pub logs: Option<LogFiles>,
}

/// Builder for one shrinker run.
#[derive(Debug, Clone)]
pub struct ShrinkerCommand<'a> {
    strategy: &'a dyn ShrinkerStrategy,
    root_config: Option<PathBuf>,
    output: Option<PathBuf>,
    max_heap_size: Option<String>,
    full_mode: bool,
    verbose: bool,
    working_dir: Option<PathBuf>,
    call_order: Vec<CallType>,
    tool: Option<ToolConfig>,
    check_exit: bool,
}

impl<'a> ShrinkerCommand<'a> {
    pub fn new(strategy: &'a dyn ShrinkerStrategy) -> Self {
        Self {
            strategy,
            root_config: None,
            output: None,
            max_heap_size: None,
            full_mode: false,
            verbose: false,
            working_dir: None,
            call_order: CallType::DEFAULT_ORDER.to_vec(),
            tool: None,
            check_exit: true,
        }
    }

    /// Set the generated `root.pro`.
    pub fn root_config(mut self, path: &Path) -> Self {
        self.root_config = Some(path.to_path_buf());
        self
    }

    /// Set the single output path for tools that take one on the command line.
    pub fn output(mut self, path: Option<&Path>) -> Self {
        self.output = path.map(Path::to_path_buf);
        self
    }

    /// Set the `-Xmx` value, e.g. `"2G"`.
    pub fn max_heap_size(mut self, size: Option<&str>) -> Self {
        self.max_heap_size = size.map(str::to_owned);
        self
    }

    pub fn full_mode(mut self, enabled: bool) -> Self {
        self.full_mode = enabled;
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    pub fn working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn call_order(mut self, order: &[CallType]) -> Self {
        self.call_order = order.to_vec();
        self
    }

    /// Set the manifest's `[tools.<kind>]` overrides.
    pub fn tool(mut self, tool: Option<&ToolConfig>) -> Self {
        self.tool = tool.cloned();
        self
    }

    /// Treat a non-zero exit as an error (the default).
    pub fn check_exit(mut self, enabled: bool) -> Self {
        self.check_exit = enabled;
        self
    }

    /// Build the `java` argument list for the given tool classpath.
    ///
    /// # Errors
    /// Returns an error if the root configuration is not set.
    pub fn build_args(&self, classpath: &str, jdk_home: &Path) -> Result<Vec<String>, ShrinkerError> {
        let Some(root_config) = &self.root_config else {
            return Err(ShrinkerError::NoRootConfig {
                tool: self.strategy.kind().to_string(),
            });
        };

        let mut args = Vec::new();
        if let Some(heap) = &self.max_heap_size {
            args.push(format!("-Xmx{heap}"));
        }
        args.push("-XX:+TieredCompilation".to_owned());
        args.push("-cp".to_owned());
        args.push(classpath.to_owned());
        args.push(self.strategy.main_class().to_owned());
        args.extend(self.strategy.args(&ToolArgs {
            root_config,
            output: self.output.as_deref(),
            jdk_home,
            full_mode: self.full_mode,
            verbose: self.verbose,
        }));
        Ok(args)
    }

    /// Run the tool, trying each call type in order until one is available.
    ///
    /// A call type whose jars cannot be provided is skipped. Once the tool
    /// has run, its result is final: a failing exit is never retried with
    /// another call type.
    ///
    /// # Errors
    /// Returns an error if no call type is available, the tool cannot be
    /// spawned, or (with exit checking on) it exits unsuccessfully.
    pub fn execute(&self, ctx: InvokeContext<'_>, logs_dir: &Path) -> Result<InvokeResult, ShrinkerError> {
        if self.call_order.is_empty() {
            return Err(ShrinkerError::EmptyCallOrder);
        }

        let mut tried = Vec::new();
        for &call_type in &self.call_order {
            match self.try_call(call_type, ctx, logs_dir) {
                Ok(result) => return Ok(result),
                Err(e) if e.is_unavailable() => {
                    tracing::info!(%call_type, reason = %e, "call type unavailable, trying next");
                    tried.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        Err(ShrinkerError::NoCallTypeAvailable {
            tool: self.strategy.kind().to_string(),
            tried: tried.join("; "),
        })
    }

    fn try_call(
        &self,
        call_type: CallType,
        ctx: InvokeContext<'_>,
        logs_dir: &Path,
    ) -> Result<InvokeResult, ShrinkerError> {
        let jars = ctx
            .resolver
            .jars_for(call_type, self.strategy, self.tool.as_ref())?;
        let classpath = match call_type {
            CallType::External => join_classpath(&jars)?,
            CallType::Bundled | CallType::InMemory => ctx.cache.get_or_load(&jars)?.classpath.clone(),
        };

        let mut cmd = Command::new(&ctx.jdk.java);
        cmd.args(self.build_args(&classpath.to_string_lossy(), &ctx.jdk.home)?);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let logs = LogFiles::timestamped(logs_dir, self.strategy.kind().as_str());
        tracing::debug!(%call_type, command = %process::render_command(&cmd), "invoking shrinker");

        match call_type {
            CallType::External | CallType::Bundled => {
                let run = process::run_logged(&mut cmd, &logs, self.check_exit)?;
                Ok(InvokeResult {
                    call_type,
                    exit_code: run.exit_code,
                    success: !run.logs_kept,
                    logs: run.logs_kept.then_some(logs),
                })
            }
            CallType::InMemory => self.run_captured(&mut cmd, logs),
        }
    }

    fn run_captured(&self, cmd: &mut Command, logs: LogFiles) -> Result<InvokeResult, ShrinkerError> {
        let output = process::run_command(cmd)?;
        for line in output.stdout.lines() {
            tracing::debug!(target: "fluxo::tool", "{line}");
        }
        for line in output.stderr.lines() {
            tracing::info!(target: "fluxo::tool", "{line}");
        }

        if output.success {
            return Ok(InvokeResult {
                call_type: CallType::InMemory,
                exit_code: output.exit_code,
                success: true,
                logs: None,
            });
        }

        logs.write_captured(&output.stdout, &output.stderr)?;
        if self.check_exit {
            return Err(process::failure_error(cmd, output.exit_code, &logs).into());
        }
        tracing::warn!(
            exit_code = ?output.exit_code,
            stderr_log = %logs.stderr.display(),
            "shrinker failed, exit code check disabled"
        );
        Ok(InvokeResult {
            call_type: CallType::InMemory,
            exit_code: output.exit_code,
            success: false,
            logs: Some(logs),
        })
    }
}
