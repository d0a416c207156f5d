//! Per-shrinker behavior behind one trait.
//!
//! Everything that differs between ProGuard and R8 (main class, where the
//! jars come from, how program jars map to outputs, command line flags) lives
//! in a [`ShrinkerStrategy`] implementation. Callers never match on
//! [`ShrinkerKind`] themselves.

use std::path::{Path, PathBuf};

use fluxo_config::ShrinkerKind;
use fluxo_util::maven::{GOOGLE_MAVEN, MAVEN_CENTRAL};

/// One program jar and, when the tool writes outputs per input, its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarPair {
    pub input: PathBuf,
    /// `None` when the tool writes a single merged output via its own flag.
    pub output: Option<PathBuf>,
}

/// How a step's jars are laid out for the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarLayout {
    /// Program jars, main jar first.
    pub program: Vec<JarPair>,
    /// Extra inputs the tool sees as library jars only.
    pub passthrough_libraries: Vec<PathBuf>,
    /// Where the processed main jar ends up.
    pub main_out: PathBuf,
    /// Single output path passed on the command line, if the tool takes one.
    pub output_arg: Option<PathBuf>,
    /// Extra program jars for the next step in the chain.
    pub downstream_inputs: Vec<PathBuf>,
}

/// Inputs for building a tool's command line after `java ... <main class>`.
#[derive(Debug, Clone)]
pub struct ToolArgs<'a> {
    pub root_config: &'a Path,
    pub output: Option<&'a Path>,
    pub jdk_home: &'a Path,
    pub full_mode: bool,
    pub verbose: bool,
}

/// Shrinker-specific behavior.
pub trait ShrinkerStrategy: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ShrinkerKind;

    /// Fully qualified entry point class of the tool.
    fn main_class(&self) -> &'static str;

    /// Default `group:artifact:version` coordinates of the tool distribution.
    fn default_coordinates(&self) -> &'static [&'static str];

    /// Maven repository hosting the distribution.
    fn repository(&self) -> &'static str;

    /// Well-known rule files, relative to the project root, included when
    /// present and no explicit files are configured.
    fn default_rule_files(&self) -> &'static [&'static str];

    /// Whether JDK platform classes go into `jars.pro` rather than on the
    /// command line.
    fn platform_in_jars_config(&self) -> bool;

    /// Map the step's jars onto the tool's input and output model.
    fn layout(
        &self,
        main_jar: &Path,
        input_files: &[PathBuf],
        out_dir: &Path,
        application: bool,
    ) -> JarLayout;

    /// Tool arguments following the main class.
    fn args(&self, args: &ToolArgs<'_>) -> Vec<String>;
}

fn out_path(out_dir: &Path, jar: &Path) -> PathBuf {
    match jar.file_name() {
        Some(name) => out_dir.join(name),
        None => out_dir.join("out.jar"),
    }
}

/// ProGuard: every program jar is written to a jar of the same name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProGuard;

impl ShrinkerStrategy for ProGuard {
    fn kind(&self) -> ShrinkerKind {
        ShrinkerKind::ProGuard
    }

    fn main_class(&self) -> &'static str {
        "proguard.ProGuard"
    }

    fn default_coordinates(&self) -> &'static [&'static str] {
        &[
            "com.guardsquare:proguard-base:7.6.1",
            "com.guardsquare:proguard-core:9.1.6",
        ]
    }

    fn repository(&self) -> &'static str {
        MAVEN_CENTRAL
    }

    fn default_rule_files(&self) -> &'static [&'static str] {
        &["pg/proguard.pro", "pg/rules.pro"]
    }

    fn platform_in_jars_config(&self) -> bool {
        true
    }

    fn layout(
        &self,
        main_jar: &Path,
        input_files: &[PathBuf],
        out_dir: &Path,
        _application: bool,
    ) -> JarLayout {
        let main_out = out_path(out_dir, main_jar);
        let mut program = vec![JarPair {
            input: main_jar.to_path_buf(),
            output: Some(main_out.clone()),
        }];
        let mut downstream = Vec::with_capacity(input_files.len());
        for input in input_files {
            let output = out_path(out_dir, input);
            downstream.push(output.clone());
            program.push(JarPair {
                input: input.clone(),
                output: Some(output),
            });
        }
        JarLayout {
            program,
            passthrough_libraries: Vec::new(),
            main_out,
            output_arg: None,
            downstream_inputs: downstream,
        }
    }

    fn args(&self, args: &ToolArgs<'_>) -> Vec<String> {
        let mut out = Vec::new();
        if args.verbose {
            out.push("-verbose".to_owned());
        }
        out.push("-include".to_owned());
        out.push(args.root_config.display().to_string());
        out
    }
}

/// R8 in class-file mode: one merged output jar.
///
/// For applications all inputs are merged into the main jar, so later steps
/// see no extra inputs. Libraries keep their extra inputs untouched: those go
/// to R8 as library jars and flow to the next step unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct R8;

impl ShrinkerStrategy for R8 {
    fn kind(&self) -> ShrinkerKind {
        ShrinkerKind::R8
    }

    fn main_class(&self) -> &'static str {
        "com.android.tools.r8.R8"
    }

    fn default_coordinates(&self) -> &'static [&'static str] {
        &["com.android.tools:r8:8.5.35"]
    }

    fn repository(&self) -> &'static str {
        GOOGLE_MAVEN
    }

    fn default_rule_files(&self) -> &'static [&'static str] {
        &["pg/r8.pro", "pg/proguard.pro", "pg/rules.pro"]
    }

    fn platform_in_jars_config(&self) -> bool {
        false
    }

    fn layout(
        &self,
        main_jar: &Path,
        input_files: &[PathBuf],
        out_dir: &Path,
        application: bool,
    ) -> JarLayout {
        let main_out = out_path(out_dir, main_jar);
        let mut program = vec![JarPair {
            input: main_jar.to_path_buf(),
            output: None,
        }];

        let (passthrough, downstream) = if application {
            program.extend(input_files.iter().map(|input| JarPair {
                input: input.clone(),
                output: None,
            }));
            (Vec::new(), Vec::new())
        } else {
            (input_files.to_vec(), input_files.to_vec())
        };

        JarLayout {
            program,
            passthrough_libraries: passthrough,
            output_arg: Some(main_out.clone()),
            main_out,
            downstream_inputs: downstream,
        }
    }

    fn args(&self, args: &ToolArgs<'_>) -> Vec<String> {
        let mut out = vec!["--classfile".to_owned()];
        if let Some(output) = args.output {
            out.push("--output".to_owned());
            out.push(output.display().to_string());
        }
        if !args.full_mode {
            out.push("--pg-compat".to_owned());
        }
        out.push("--pg-conf".to_owned());
        out.push(args.root_config.display().to_string());
        out.push("--lib".to_owned());
        out.push(args.jdk_home.display().to_string());
        out
    }
}

/// The strategy for `kind`.
pub fn strategy_for(kind: ShrinkerKind) -> &'static dyn ShrinkerStrategy {
    match kind {
        ShrinkerKind::ProGuard => &ProGuard,
        ShrinkerKind::R8 => &R8,
    }
}
