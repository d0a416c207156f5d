//! Turn a configured chain into an immutable execution plan.
//!
//! Planning is pure apart from checking which rule files exist: no tool is
//! resolved or run here, so `fluxo plan` works offline and without a JDK.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fluxo_config::manifest::{Manifest, ProjectKind};
use fluxo_config::{CallType, ChainConfig, ShrinkerKind};
use fluxo_shrinker::rules::{resolve_rule_files, ReportPaths};
use fluxo_shrinker::{strategy_for, JarLayout, ToolResolver};

use crate::error::EngineError;

/// Everything one step needs, resolved to plain values.
#[derive(Debug, Clone)]
pub struct StepPlan {
    /// Zero-based position in the chain.
    pub index: usize,
    pub kind: ShrinkerKind,
    /// Tool coordinates the bundled call would use.
    pub coordinates: Vec<String>,
    pub call_order: Vec<CallType>,
    pub main_jar_in: PathBuf,
    pub main_jar_out: PathBuf,
    /// Extra program jars besides the main jar.
    pub input_files: Vec<PathBuf>,
    pub layout: JarLayout,
    pub library_jars: Vec<PathBuf>,
    pub filter_multi_release: bool,
    pub step_dir: PathBuf,
    pub out_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub work_dir: PathBuf,
    pub reports: ReportPaths,
    pub optimize: bool,
    pub obfuscate: bool,
    pub full_mode: bool,
    pub max_heap_size: Option<String>,
    /// Mapping from earlier steps this step continues from.
    pub apply_mapping: Option<PathBuf>,
    pub main_class: Option<String>,
    pub rule_files: Vec<PathBuf>,
    /// Whether this is the chain's last step.
    pub tail: bool,
}

impl StepPlan {
    /// `step-<n>-<kind>`, with `n` starting at 1.
    pub fn label(&self) -> String {
        step_dir_name(self.index, self.kind)
    }

    /// Jars the tool processes into `out_dir`. Inputs passed through as
    /// library jars are not among them.
    pub fn program_inputs(&self) -> Vec<PathBuf> {
        self.layout.program.iter().map(|p| p.input.clone()).collect()
    }
}

/// An ordered, immutable plan for one chain.
#[derive(Debug, Clone)]
pub struct ChainPlan {
    pub chain_id: String,
    pub replace_outputs: bool,
    pub steps: Vec<StepPlan>,
    /// Non-fatal configuration problems found while planning.
    pub warnings: Vec<String>,
    /// Mapping describing the final obfuscated names, if any step obfuscated.
    pub final_mapping: Option<PathBuf>,
}

impl ChainPlan {
    pub fn tail(&self) -> Option<&StepPlan> {
        self.steps.last()
    }
}

/// Plans chains against one manifest.
#[derive(Debug)]
pub struct ChainBuilder<'a> {
    manifest: &'a Manifest,
    project_dir: &'a Path,
    extra_rule_files: Vec<PathBuf>,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(manifest: &'a Manifest, project_dir: &'a Path) -> Self {
        Self {
            manifest,
            project_dir,
            extra_rule_files: Vec::new(),
        }
    }

    /// Add a rule file to every step, after the step's own files.
    pub fn extra_rule_file(mut self, path: &Path) -> Self {
        self.extra_rule_files.push(path.to_path_buf());
        self
    }

    /// Root of every chain's run directories: `<build-dir>/fluxo`.
    pub fn run_root(&self) -> PathBuf {
        resolve(self.project_dir, &self.manifest.project.build_dir).join("fluxo")
    }

    /// Produce the plan for `chain`.
    ///
    /// # Errors
    /// Returns an error if a configured rule file is missing or a tool
    /// coordinate is malformed.
    pub fn plan(&self, chain: &ChainConfig) -> Result<ChainPlan, EngineError> {
        let project = &self.manifest.project;
        let application = project.kind == ProjectKind::Application;
        let chain_dir = self.run_root().join(&chain.id);
        let library_jars: Vec<PathBuf> = project
            .library_jars
            .iter()
            .map(|p| resolve(self.project_dir, p))
            .collect();

        let mut main_jar = resolve(self.project_dir, &project.main_jar);
        let mut inputs: Vec<PathBuf> = project
            .input_jars
            .iter()
            .map(|p| resolve(self.project_dir, p))
            .collect();
        let mut carried_mapping: Option<PathBuf> = None;
        let mut warnings = Vec::new();
        let mut steps = Vec::with_capacity(chain.len());

        let configs = chain.steps();
        for (index, step) in configs.iter().enumerate() {
            let strategy = strategy_for(step.shrinker);
            let step_dir = chain_dir.join(step_dir_name(index, step.shrinker));
            let out_dir = step_dir.join("out");
            let reports_dir = step_dir.join("reports");
            let reports = ReportPaths::under(&reports_dir);
            let layout = strategy.layout(&main_jar, &inputs, &out_dir, application);
            check_output_collisions(&chain.id, &step_dir_name(index, step.shrinker), &layout)?;

            let next = configs.get(index + 1);
            if let Some(next) = next {
                if step.obfuscate && next.obfuscate_incrementally && !step.obfuscate_incrementally {
                    let warning = format!(
                        "chain `{}`: step {} obfuscates without obfuscate-incrementally, \
                         but step {} obfuscates incrementally from its mapping",
                        chain.id,
                        index + 1,
                        index + 2
                    );
                    tracing::warn!("{warning}");
                    warnings.push(warning);
                }
            }

            let apply_mapping = if step.obfuscate && step.obfuscate_incrementally {
                carried_mapping.clone()
            } else {
                None
            };
            if step.obfuscate {
                carried_mapping = Some(reports.mapping.clone());
            }

            let mut rule_files =
                resolve_rule_files(strategy, &step.configuration_files, self.project_dir)?;
            rule_files.extend(self.extra_rule_files.iter().cloned());

            let coordinates =
                ToolResolver::coordinates(strategy, self.manifest.tools.for_kind(step.shrinker))?
                    .iter()
                    .map(ToString::to_string)
                    .collect();

            let plan = StepPlan {
                index,
                kind: step.shrinker,
                coordinates,
                call_order: step.call_fallback_order.clone(),
                main_jar_in: main_jar.clone(),
                main_jar_out: layout.main_out.clone(),
                input_files: inputs.clone(),
                library_jars: library_jars.clone(),
                filter_multi_release: project.filter_multi_release,
                out_dir,
                reports_dir,
                logs_dir: step_dir.join("logs"),
                work_dir: step_dir.join("work"),
                step_dir,
                reports,
                optimize: step.optimize,
                obfuscate: step.obfuscate,
                full_mode: step.full_mode,
                max_heap_size: step.max_heap_size.clone(),
                apply_mapping,
                main_class: project.main_class.clone(),
                rule_files,
                tail: next.is_none(),
                layout: layout.clone(),
            };
            tracing::debug!(
                chain = %chain.id,
                step = %plan.label(),
                input = %plan.main_jar_in.display(),
                output = %plan.main_jar_out.display(),
                "step planned"
            );
            steps.push(plan);

            main_jar = layout.main_out;
            inputs = layout.downstream_inputs;
        }

        Ok(ChainPlan {
            chain_id: chain.id.clone(),
            replace_outputs: chain.replace_outputs,
            steps,
            warnings,
            final_mapping: carried_mapping,
        })
    }
}

/// Every program jar must map to its own output file.
fn check_output_collisions(chain: &str, step: &str, layout: &JarLayout) -> Result<(), EngineError> {
    let mut seen: BTreeMap<&Path, &Path> = BTreeMap::new();
    for pair in &layout.program {
        let Some(output) = pair.output.as_deref() else {
            continue;
        };
        if let Some(first) = seen.insert(output, pair.input.as_path()) {
            return Err(EngineError::OutputCollision {
                chain: chain.to_owned(),
                step: step.to_owned(),
                output: output.to_path_buf(),
                first: first.to_path_buf(),
                second: pair.input.clone(),
            });
        }
    }
    Ok(())
}

fn step_dir_name(index: usize, kind: ShrinkerKind) -> String {
    format!("step-{}-{}", index + 1, kind.as_str())
}

/// Resolve a manifest path against the project directory.
pub(crate) fn resolve(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}
