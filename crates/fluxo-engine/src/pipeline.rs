//! Run orchestration: plan every chain, run them, replace outputs, verify.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use fluxo_config::manifest::{KeepRulesMode, Manifest};
use fluxo_config::{CallType, ChainConfig, Lockfile};
use fluxo_shrinker::rules::{write_configs, JarsConfig, RootConfig};
use fluxo_shrinker::{
    detect_jdk, strategy_for, ClasspathCache, InvokeContext, ShrinkerCommand, ToolResolver,
};

use crate::api::ApiDump;
use crate::error::EngineError;
use crate::keep_rules::{write_keep_rules, KEEP_RULES_FILE};
use crate::plan::{resolve, ChainBuilder, ChainPlan, StepPlan};
use crate::replace::{ArtifactReplacer, OutputsRecord};
use crate::savings::SavingsReport;
use crate::seeds::{verify as diff_seeds, SeedsReport, VerificationDiff};

const MANIFEST_FILE: &str = "fluxo.toml";
const LOCKFILE_FILE: &str = "fluxo.lock";
const REPORT_FILE: &str = "report.json";

/// Options controlling a `shrink` run.
#[derive(Debug, Clone)]
pub struct ShrinkOptions {
    /// Run only this chain.
    pub chain: Option<String>,
    /// Pass `-verbose` to the tools.
    pub verbose: bool,
    /// Forbid downloads and lockfile changes.
    pub locked: bool,
    /// Fail a step when its tool exits non-zero.
    pub check_exit: bool,
    /// Tool store root; defaults to `$FLUXO_HOME/tools`.
    pub tool_store: Option<PathBuf>,
}

impl Default for ShrinkOptions {
    fn default() -> Self {
        Self {
            chain: None,
            verbose: false,
            locked: false,
            check_exit: true,
            tool_store: None,
        }
    }
}

/// Lifecycle of a chain within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainState {
    Configured,
    Planned,
    Invoking,
    StepSucceeded,
    StepFailed,
    ChainComplete,
    Replaced,
    Verified,
}

impl ChainState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Planned => "planned",
            Self::Invoking => "invoking",
            Self::StepSucceeded => "step-succeeded",
            Self::StepFailed => "step-failed",
            Self::ChainComplete => "chain-complete",
            Self::Replaced => "replaced",
            Self::Verified => "verified",
        }
    }
}

fn enter(chain: &str, state: ChainState) {
    tracing::debug!(chain, state = state.as_str(), "chain state");
}

/// Final state of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum ChainOutcome {
    ChainComplete,
    Replaced,
    Verified,
    StepFailed { step: String, error: String },
}

impl ChainOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::StepFailed { .. })
    }
}

/// One step that ran to completion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepReport {
    pub step: String,
    pub call_type: CallType,
    pub output: PathBuf,
    pub savings: SavingsReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChainReport {
    pub chain: String,
    pub outcome: ChainOutcome,
    pub steps: Vec<StepReport>,
    pub warnings: Vec<String>,
    /// The tail jar, when every step succeeded.
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationDiff>,
    /// Why the chain's seeds could not be verified at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_error: Option<String>,
}

/// Result of a whole run. Chain failures are recorded here, not returned as
/// errors, so sibling chains always report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunReport {
    pub chains: Vec<ChainReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_rules: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<OutputsRecord>,
    #[serde(skip)]
    pub duration: Duration,
}

impl RunReport {
    pub fn failed_chains(&self) -> Vec<&ChainReport> {
        self.chains
            .iter()
            .filter(|c| !c.outcome.is_success())
            .collect()
    }

    /// Turn recorded failures into an error.
    ///
    /// # Errors
    /// Returns `ChainsFailed` listing every failed chain, `VerificationFailed`
    /// for the first chain whose seeds did not match, or `VerificationError`
    /// for the first chain whose seeds could not be checked.
    pub fn check(&self) -> Result<(), EngineError> {
        let failed = self.failed_chains();
        if !failed.is_empty() {
            return Err(EngineError::ChainsFailed {
                count: failed.len(),
                chains: failed
                    .iter()
                    .map(|c| c.chain.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        for chain in &self.chains {
            if let Some(diff) = chain.verification.as_ref().filter(|d| !d.is_clean()) {
                return Err(EngineError::VerificationFailed {
                    chain: chain.chain.clone(),
                    diff: diff.to_string(),
                });
            }
            if let Some(message) = &chain.verification_error {
                return Err(EngineError::VerificationError {
                    chain: chain.chain.clone(),
                    message: message.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Run every selected chain of the project.
///
/// Steps:
/// 1. Read `fluxo.toml` and flatten the declared chains
/// 2. Generate keep rules from the API dump when configured
/// 3. Detect the JDK and check that every input jar exists
/// 4. Plan each chain
/// 5. Run chains in parallel, steps of a chain in order
/// 6. Close the classpath cache and persist new lockfile pins
/// 7. Install the last successful replacing chain's output
/// 8. Verify tail seeds against the API dump when configured
///
/// # Errors
/// Returns an error for configuration problems found before any tool runs,
/// and for failures of the replacement or report writing. Failures inside a
/// chain are recorded in the returned report.
pub fn shrink(project_dir: &Path, options: &ShrinkOptions) -> Result<RunReport, EngineError> {
    let start = Instant::now();

    // 1. Manifest and chains.
    let manifest = Manifest::from_path(&project_dir.join(MANIFEST_FILE))?;
    let chains = select_chains(manifest.resolve_chains()?, options.chain.as_deref())?;
    for chain in &chains {
        enter(&chain.id, ChainState::Configured);
    }

    // 2. Keep rules.
    let mut builder = ChainBuilder::new(&manifest, project_dir);
    let run_root = builder.run_root();
    let mut rules_path = None;
    if let Some(api) = manifest
        .api
        .as_ref()
        .filter(|a| a.keep_rules != KeepRulesMode::Disabled)
    {
        let path = write_keep_rules(&resolve(project_dir, &api.dump), &run_root)?;
        if api.keep_rules == KeepRulesMode::Standalone {
            eprintln!("    Generated {}", path.display());
            return Ok(RunReport {
                chains: Vec::new(),
                keep_rules: Some(path),
                outputs: None,
                duration: start.elapsed(),
            });
        }
        builder = builder.extra_rule_file(&path);
        rules_path = Some(path);
    }

    // 3. JDK and inputs, before anything runs.
    let jdk_home = manifest
        .project
        .jdk_home
        .as_deref()
        .map(|p| resolve(project_dir, p));
    let jdk = detect_jdk(jdk_home.as_deref())?;
    check_inputs(&manifest, project_dir)?;

    // 4. Plans.
    let plans = chains
        .iter()
        .map(|c| builder.plan(c))
        .collect::<Result<Vec<_>, _>>()?;
    for plan in &plans {
        enter(&plan.chain_id, ChainState::Planned);
    }

    // 5. Run.
    let lockfile_path = project_dir.join(LOCKFILE_FILE);
    let store = match &options.tool_store {
        Some(dir) => dir.clone(),
        None => fluxo_shrinker::toolchain::tools_dir()?,
    };
    let resolver = ToolResolver::new(&store, Lockfile::from_path(&lockfile_path)?, options.locked);
    let cache = ClasspathCache::new();
    let ctx = InvokeContext {
        jdk: &jdk,
        resolver: &resolver,
        cache: &cache,
    };
    let mut reports: Vec<ChainReport> = plans
        .par_iter()
        .map(|plan| run_chain(plan, ctx, &manifest, project_dir, options))
        .collect();

    // 6. Run-scoped resources.
    let released = cache.close()?;
    tracing::debug!(released, "classpath cache closed");
    if !options.locked && resolver.save_lockfile(&lockfile_path)? {
        tracing::info!(path = %lockfile_path.display(), "lockfile updated");
    }

    // 7. Replacement.
    let outputs = install_outputs(&manifest, project_dir, &plans, &mut reports, &run_root)?;

    // 8. Verification.
    if let Some(api) = manifest.api.as_ref().filter(|a| a.verify) {
        let expected = SeedsReport::from_api(&ApiDump::from_path(&resolve(project_dir, &api.dump))?);
        for (plan, report) in plans.iter().zip(reports.iter_mut()) {
            if !report.outcome.is_success() {
                continue;
            }
            let diff = match verify_chain(plan, &expected) {
                Ok(diff) => diff,
                Err(e) => {
                    tracing::error!(chain = %plan.chain_id, error = %e, "seeds cannot be verified");
                    report.verification_error = Some(e.to_string());
                    continue;
                }
            };
            if diff.is_clean() {
                report.outcome = ChainOutcome::Verified;
                enter(&plan.chain_id, ChainState::Verified);
            } else {
                tracing::error!(chain = %plan.chain_id, missing = diff.missing.len(), unexpected = diff.unexpected.len(), "seeds do not match the API dump");
            }
            report.verification = Some(diff);
        }
    }

    let report = RunReport {
        chains: reports,
        keep_rules: rules_path,
        outputs,
        duration: start.elapsed(),
    };
    write_report(&report, &run_root)?;
    Ok(report)
}

fn select_chains(
    chains: Vec<ChainConfig>,
    only: Option<&str>,
) -> Result<Vec<ChainConfig>, EngineError> {
    if chains.is_empty() {
        return Err(EngineError::NoChains);
    }
    let Some(id) = only else {
        return Ok(chains);
    };
    if chains.iter().any(|c| c.id == id) {
        return Ok(chains.into_iter().filter(|c| c.id == id).collect());
    }
    Err(EngineError::UnknownChain {
        chain: id.to_owned(),
        declared: chains
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn check_inputs(manifest: &Manifest, project_dir: &Path) -> Result<(), EngineError> {
    let project = &manifest.project;
    let roles = std::iter::once(("main jar", &project.main_jar))
        .chain(project.input_jars.iter().map(|p| ("input jar", p)))
        .chain(project.library_jars.iter().map(|p| ("library jar", p)));
    for (role, path) in roles {
        let path = resolve(project_dir, path);
        if !path.is_file() {
            return Err(EngineError::MissingInput { role, path });
        }
    }
    Ok(())
}

fn run_chain(
    plan: &ChainPlan,
    ctx: InvokeContext<'_>,
    manifest: &Manifest,
    project_dir: &Path,
    options: &ShrinkOptions,
) -> ChainReport {
    let mut report = ChainReport {
        chain: plan.chain_id.clone(),
        outcome: ChainOutcome::ChainComplete,
        steps: Vec::with_capacity(plan.steps.len()),
        warnings: plan.warnings.clone(),
        output: None,
        verification: None,
        verification_error: None,
    };
    eprintln!(
        "    Shrinking chain `{}` ({} step(s))",
        plan.chain_id,
        plan.steps.len()
    );

    for step in &plan.steps {
        enter(&plan.chain_id, ChainState::Invoking);
        match run_step(&plan.chain_id, step, ctx, manifest, project_dir, options) {
            Ok(step_report) => {
                enter(&plan.chain_id, ChainState::StepSucceeded);
                report.steps.push(step_report);
            }
            Err(e) => {
                enter(&plan.chain_id, ChainState::StepFailed);
                tracing::error!(chain = %plan.chain_id, step = %step.label(), error = %e, "step failed");
                report.outcome = ChainOutcome::StepFailed {
                    step: step.label(),
                    error: e.to_string(),
                };
                return report;
            }
        }
    }

    enter(&plan.chain_id, ChainState::ChainComplete);
    report.output = plan.tail().map(|t| t.main_jar_out.clone());
    report
}

fn run_step(
    chain: &str,
    step: &StepPlan,
    ctx: InvokeContext<'_>,
    manifest: &Manifest,
    project_dir: &Path,
    options: &ShrinkOptions,
) -> Result<StepReport, EngineError> {
    let strategy = strategy_for(step.kind);

    // Partial output from an earlier run must never survive into this one.
    fluxo_util::fs::clear_dir(&step.out_dir)?;
    fluxo_util::fs::ensure_dir(&step.reports_dir)?;
    fluxo_util::fs::ensure_dir(&step.logs_dir)?;

    let jdk_files = if strategy.platform_in_jars_config() {
        Some(ctx.jdk.library_files()?)
    } else {
        None
    };
    let jars = JarsConfig {
        layout: &step.layout,
        library_jars: &step.library_jars,
        jdk: jdk_files
            .as_deref()
            .map(|files| (&ctx.jdk.libraries, files)),
        filter_multi_release: step.filter_multi_release,
    };
    let root = RootConfig {
        optimize: step.optimize,
        obfuscate: step.obfuscate,
        apply_mapping: step.apply_mapping.clone(),
        main_class: step.main_class.clone(),
        rule_files: step.rule_files.clone(),
    };
    let configs = write_configs(&step.work_dir, &jars, &root, &step.reports)?;
    let tool = manifest
        .tools
        .for_kind(step.kind)
        .map(|t| t.resolved(project_dir));

    let result = ShrinkerCommand::new(strategy)
        .root_config(&configs.root)
        .output(step.layout.output_arg.as_deref())
        .max_heap_size(step.max_heap_size.as_deref())
        .full_mode(step.full_mode)
        .verbose(options.verbose)
        .working_dir(project_dir)
        .call_order(&step.call_order)
        .tool(tool.as_ref())
        .check_exit(options.check_exit)
        .execute(ctx, &step.logs_dir)?;

    if !step.main_jar_out.is_file() {
        return Err(EngineError::MissingOutput {
            tool: step.kind.to_string(),
            path: step.main_jar_out.clone(),
        });
    }

    let savings = SavingsReport::measure(&step.program_inputs(), &step.out_dir)?;
    savings.log(chain, &step.label());
    eprintln!(
        "    {} {} [{}]: {savings}",
        step.kind,
        step.label(),
        result.call_type
    );

    Ok(StepReport {
        step: step.label(),
        call_type: result.call_type,
        output: step.main_jar_out.clone(),
        savings,
    })
}

/// Install the tail jar of the last replacing chain that succeeded.
fn install_outputs(
    manifest: &Manifest,
    project_dir: &Path,
    plans: &[ChainPlan],
    reports: &mut [ChainReport],
    run_root: &Path,
) -> Result<Option<OutputsRecord>, EngineError> {
    let candidate = plans
        .iter()
        .zip(reports.iter_mut())
        .rev()
        .find(|(plan, report)| plan.replace_outputs && report.outcome.is_success());
    let Some((plan, report)) = candidate else {
        return Ok(None);
    };
    let Some(tail) = plan.tail() else {
        return Ok(None);
    };

    let replacer = ArtifactReplacer::new();
    let record = replacer.install(
        manifest,
        project_dir,
        &plan.chain_id,
        &tail.main_jar_out,
        plan.final_mapping.as_deref(),
        run_root,
    )?;
    report.outcome = ChainOutcome::Replaced;
    enter(&plan.chain_id, ChainState::Replaced);
    Ok(Some(record))
}

fn verify_chain(plan: &ChainPlan, expected: &SeedsReport) -> Result<VerificationDiff, EngineError> {
    let Some(tail) = plan.tail() else {
        return Ok(VerificationDiff::default());
    };
    if !tail.reports.seeds.is_file() {
        return Err(EngineError::NoSeeds {
            chain: plan.chain_id.clone(),
            path: tail.reports.seeds.clone(),
        });
    }
    let seeds = SeedsReport::from_path(&tail.reports.seeds)?;
    Ok(diff_seeds(&seeds, expected))
}

fn write_report(report: &RunReport, run_root: &Path) -> Result<(), EngineError> {
    fluxo_util::fs::ensure_dir(run_root)?;
    let path = run_root.join(REPORT_FILE);
    let json = serde_json::to_string_pretty(report).map_err(|e| EngineError::Report {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(&path, json).map_err(|e| EngineError::io(&path, e))
}

/// Builder for a manifest, with the generated keep rules attached when the
/// API section asks for them before every chain.
fn builder_for<'a>(manifest: &'a Manifest, project_dir: &'a Path) -> ChainBuilder<'a> {
    let builder = ChainBuilder::new(manifest, project_dir);
    let before_chain = manifest
        .api
        .as_ref()
        .is_some_and(|a| a.keep_rules == KeepRulesMode::BeforeChain);
    if before_chain {
        let rules = builder.run_root().join(KEEP_RULES_FILE);
        builder.extra_rule_file(&rules)
    } else {
        builder
    }
}

/// Plan the selected chains without running anything.
///
/// # Errors
/// Returns an error if the manifest is invalid or the chain is unknown.
pub fn plan_chains(project_dir: &Path, chain: Option<&str>) -> Result<Vec<ChainPlan>, EngineError> {
    let manifest = Manifest::from_path(&project_dir.join(MANIFEST_FILE))?;
    let chains = select_chains(manifest.resolve_chains()?, chain)?;
    let builder = builder_for(&manifest, project_dir);
    chains.iter().map(|c| builder.plan(c)).collect()
}

/// Generate `keep-rules.pro` from the API dump.
///
/// # Errors
/// Returns `NoApiConfig` without an `[api]` section, or an error if the dump
/// cannot be parsed.
pub fn keep_rules(project_dir: &Path) -> Result<PathBuf, EngineError> {
    let manifest = Manifest::from_path(&project_dir.join(MANIFEST_FILE))?;
    let api = manifest.api.as_ref().ok_or(EngineError::NoApiConfig)?;
    let run_root = ChainBuilder::new(&manifest, project_dir).run_root();
    write_keep_rules(&resolve(project_dir, &api.dump), &run_root)
}

/// Verification result of one chain.
#[derive(Debug, Clone)]
pub struct ChainVerification {
    pub chain: String,
    pub diff: VerificationDiff,
}

/// Compare the tail seeds of each selected chain with the API dump.
///
/// # Errors
/// Returns `NoApiConfig` without an `[api]` section, and `NoSeeds` for a
/// chain that has not been run.
pub fn verify(project_dir: &Path, chain: Option<&str>) -> Result<Vec<ChainVerification>, EngineError> {
    let manifest = Manifest::from_path(&project_dir.join(MANIFEST_FILE))?;
    let api = manifest.api.as_ref().ok_or(EngineError::NoApiConfig)?;
    let expected = SeedsReport::from_api(&ApiDump::from_path(&resolve(project_dir, &api.dump))?);
    let builder = builder_for(&manifest, project_dir);

    select_chains(manifest.resolve_chains()?, chain)?
        .iter()
        .map(|c| {
            let plan = builder.plan(c)?;
            Ok(ChainVerification {
                chain: plan.chain_id.clone(),
                diff: verify_chain(&plan, &expected)?,
            })
        })
        .collect()
}

/// Remove `<build-dir>/fluxo`. Returns whether anything was removed.
///
/// # Errors
/// Returns an error if the manifest cannot be read or the directory cannot
/// be removed.
pub fn clean(project_dir: &Path) -> Result<bool, EngineError> {
    let manifest = Manifest::from_path(&project_dir.join(MANIFEST_FILE))?;
    let run_root = ChainBuilder::new(&manifest, project_dir).run_root();
    let existed = run_root.exists();
    fluxo_util::fs::remove_dir_all_if_exists(&run_root)?;
    Ok(existed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn shrink_fails_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let err = shrink(tmp.path(), &ShrinkOptions::default()).unwrap_err();
        assert!(err.to_string().contains("fluxo.toml"), "{err}");
    }

    #[test]
    fn unknown_chain_lists_declared() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join(MANIFEST_FILE),
            "[project]\nname = \"demo\"\nmain-jar = \"app.jar\"\n\n\
             [[chain]]\nid = \"release\"\nsteps = [{ shrinker = \"proguard\" }]\n",
        );
        let err = plan_chains(tmp.path(), Some("debug")).unwrap_err().to_string();
        assert!(err.contains("`debug`") && err.contains("release"), "{err}");
    }

    #[test]
    fn no_chains_is_an_error() {
        let err = select_chains(Vec::new(), None).unwrap_err();
        assert!(matches!(err, EngineError::NoChains));
    }

    #[test]
    fn keep_rules_requires_api_section() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join(MANIFEST_FILE),
            "[project]\nname = \"demo\"\nmain-jar = \"app.jar\"\n",
        );
        assert!(matches!(
            keep_rules(tmp.path()).unwrap_err(),
            EngineError::NoApiConfig
        ));
    }

    #[test]
    fn clean_removes_run_root() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            &tmp.path().join(MANIFEST_FILE),
            "[project]\nname = \"demo\"\nmain-jar = \"app.jar\"\n",
        );
        write(&tmp.path().join("build/fluxo/release/x.txt"), "x");
        assert!(clean(tmp.path()).unwrap());
        assert!(!tmp.path().join("build/fluxo").exists());
        assert!(!clean(tmp.path()).unwrap());
    }

    #[test]
    fn run_report_check_lists_failed_chains() {
        let chain = |id: &str, outcome| ChainReport {
            chain: id.to_owned(),
            outcome,
            steps: Vec::new(),
            warnings: Vec::new(),
            output: None,
            verification: None,
            verification_error: None,
        };
        let report = RunReport {
            chains: vec![
                chain("a", ChainOutcome::Replaced),
                chain(
                    "b",
                    ChainOutcome::StepFailed {
                        step: "step-1-r8".to_owned(),
                        error: "boom".to_owned(),
                    },
                ),
            ],
            keep_rules: None,
            outputs: None,
            duration: Duration::ZERO,
        };
        let err = report.check().unwrap_err().to_string();
        assert!(err.contains("1 chain(s) failed: b"), "{err}");
    }

    #[test]
    fn run_report_check_reports_unverifiable_chain() {
        let report = RunReport {
            chains: vec![ChainReport {
                chain: "quiet".to_owned(),
                outcome: ChainOutcome::ChainComplete,
                steps: Vec::new(),
                warnings: Vec::new(),
                output: None,
                verification: None,
                verification_error: Some("no seeds report".to_owned()),
            }],
            keep_rules: None,
            outputs: None,
            duration: Duration::ZERO,
        };
        assert!(matches!(
            report.check().unwrap_err(),
            EngineError::VerificationError { chain, .. } if chain == "quiet"
        ));
    }

    #[cfg(unix)]
    mod end_to_end {
        use super::*;
        use crate::savings::SavingsVerdict;
        use std::os::unix::fs::PermissionsExt;

        /// Stands in for `java` running either tool. Copies `-injars` to
        /// `-outjars` (or the first program jar to R8's `--output`), writes a
        /// mapping that starts with the applied one, and prints the kept main
        /// class as seeds. Including `fail.pro` makes it exit 1; including
        /// `noseeds.pro` skips the seeds report.
        const FAKE_JAVA: &str = r##"#!/bin/sh
root=""
output=""
while [ $# -gt 0 ]; do
  case "$1" in
    -include|--pg-conf) root="$2" ;;
    --output) output="$2" ;;
  esac
  shift
done
if grep -q "fail.pro" "$root"; then
  echo "Error: rejected by fail.pro" >&2
  exit 1
fi
jars=$(sed -n "s/^-include '\(.*\)'$/\1/p" "$root" | head -n 1)
in=""
while IFS= read -r line; do
  case "$line" in
    -injars*)
      in=$(echo "$line" | sed "s/^-injars '\([^']*\)'.*/\1/")
      if [ -n "$output" ] && [ ! -f "$output" ]; then
        mkdir -p "$(dirname "$output")"
        cp "$in" "$output"
      fi ;;
    -outjars*)
      out=$(echo "$line" | sed "s/^-outjars '\([^']*\)'.*/\1/")
      mkdir -p "$(dirname "$out")"
      cp "$in" "$out" ;;
  esac
done < "$jars"
mapping=$(sed -n "s/^-printmapping '\(.*\)'$/\1/p" "$root")
applied=$(sed -n "s/^-applymapping '\(.*\)'$/\1/p" "$root")
if [ -n "$mapping" ]; then
  : > "$mapping"
  if [ -n "$applied" ]; then cat "$applied" >> "$mapping"; fi
  step=$(basename "$(dirname "$(dirname "$mapping")")")
  echo "com.example.MainKt -> a: $step" >> "$mapping"
fi
if grep -q "noseeds.pro" "$root"; then exit 0; fi
seeds=$(sed -n "s/^-printseeds '\(.*\)'$/\1/p" "$root")
main=$(sed -n "s/^-keep public class \(.*\) {$/\1/p" "$root")
echo "$main" > "$seeds"
echo "$main: void main(java.lang.String[])" >> "$seeds"
exit 0
"##;

        const RELEASE: &str = r#"
[[chain]]
id = "release"
steps = [{ shrinker = "proguard", call-fallback-order = ["external"] }]
"#;

        const API_DUMP: &str = "public final class com/example/MainKt {\n\
                                \tpublic static final fun main ([Ljava/lang/String;)V\n}\n";

        struct Project {
            _tmp: tempfile::TempDir,
            dir: PathBuf,
        }

        impl Project {
            fn step_dir(&self, chain: &str, step: &str) -> PathBuf {
                self.dir.join("build/fluxo").join(chain).join(step)
            }
        }

        fn project_with(kind: &str, project_extra: &str, chains: &str) -> Project {
            let tmp = tempfile::tempdir().unwrap();
            let dir = tmp.path().to_path_buf();

            let java = dir.join("jdk/bin/java");
            write(&java, FAKE_JAVA);
            std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
            write(&dir.join("jdk/jmods/java.base.jmod"), "jmod");
            write(&dir.join("tools/proguard.jar"), "pg");
            write(&dir.join("tools/r8.jar"), "r8");
            write(&dir.join("build/libs/app.jar"), "application classes");
            write(&dir.join("pg/fail.pro"), "# rejected by the tool\n");
            write(&dir.join("pg/noseeds.pro"), "# no seeds report\n");

            write(
                &dir.join(MANIFEST_FILE),
                &format!(
                    r#"
[project]
name = "app"
kind = "{kind}"
main-jar = "build/libs/app.jar"
main-class = "com.example.MainKt"
jdk-home = "jdk"
{project_extra}

[tools.proguard]
jars = ["tools/proguard.jar"]

[tools.r8]
jars = ["tools/r8.jar"]
{chains}
[[artifact]]
name = "app"
file = "build/libs/app.jar"
"#
                ),
            );
            Project { _tmp: tmp, dir }
        }

        fn project() -> Project {
            project_with("application", "", RELEASE)
        }

        fn options(p: &Project) -> ShrinkOptions {
            ShrinkOptions {
                tool_store: Some(p.dir.join("store")),
                ..ShrinkOptions::default()
            }
        }

        fn outcome(report: &RunReport, chain: &str) -> Option<ChainOutcome> {
            report
                .chains
                .iter()
                .find(|c| c.chain == chain)
                .map(|c| c.outcome.clone())
        }

        #[test]
        fn single_proguard_step_produces_outputs() {
            let p = project();
            let report = shrink(&p.dir, &options(&p)).unwrap();
            report.check().unwrap();

            let step_dir = p.step_dir("release", "step-1-proguard");
            let out = step_dir.join("out/app.jar");
            assert!(out.is_file());
            let seeds = std::fs::read_to_string(step_dir.join("reports/seeds.txt")).unwrap();
            assert!(seeds.contains("com.example.MainKt"), "{seeds}");
            assert!(!step_dir.join("reports/mapping.txt").exists());
            assert!(step_dir.join("work/jars.pro").is_file());

            let chain = report.chains.first().unwrap();
            assert_eq!(chain.outcome, ChainOutcome::Replaced);
            assert_eq!(chain.steps.first().unwrap().call_type, CallType::External);
            let outputs = report.outputs.unwrap();
            assert_eq!(outputs.artifacts.first().unwrap().file, out);
            assert!(p.dir.join("build/fluxo/outputs.json").is_file());
            assert!(p.dir.join("build/fluxo/report.json").is_file());
        }

        #[test]
        fn tool_jars_resolve_against_the_project_not_the_cwd() {
            let p = project();
            assert_ne!(std::env::current_dir().unwrap(), p.dir);
            let report = shrink(&p.dir, &options(&p)).unwrap();
            assert_eq!(outcome(&report, "release"), Some(ChainOutcome::Replaced));
        }

        #[test]
        fn keep_rules_and_verification_run_with_the_chain() {
            let p = project();
            write(&p.dir.join("api/app.api"), API_DUMP);
            let manifest = std::fs::read_to_string(p.dir.join(MANIFEST_FILE)).unwrap();
            write(
                &p.dir.join(MANIFEST_FILE),
                &format!("{manifest}\n[api]\ndump = \"api/app.api\"\nkeep-rules = \"before-chain\"\nverify = true\n"),
            );

            let report = shrink(&p.dir, &options(&p)).unwrap();
            report.check().unwrap();
            assert!(report.keep_rules.as_ref().is_some_and(|k| k.is_file()));
            let root = std::fs::read_to_string(
                p.step_dir("release", "step-1-proguard").join("work/root.pro"),
            )
            .unwrap();
            assert!(root.contains("keep-rules.pro"), "{root}");
            assert_eq!(outcome(&report, "release"), Some(ChainOutcome::Verified));

            let verified = verify(&p.dir, None).unwrap();
            assert!(verified.iter().all(|v| v.diff.is_clean()));
        }

        #[test]
        fn failing_tool_fails_the_chain_only() {
            let p = project();
            write(&p.dir.join("jdk/bin/java"), "#!/bin/sh\necho 'Error: broken' >&2\nexit 1\n");
            let report = shrink(&p.dir, &options(&p)).unwrap();
            let failed = report.failed_chains();
            assert_eq!(failed.len(), 1);
            assert!(matches!(
                &failed.first().unwrap().outcome,
                ChainOutcome::StepFailed { step, error } if step == "step-1-proguard" && error.contains("exit code 1")
            ));
            assert!(report.outputs.is_none());
            assert!(report.check().is_err());
        }

        #[test]
        fn surviving_chain_replaces_outputs_when_a_sibling_fails() {
            let p = project_with(
                "application",
                "",
                r#"
[[chain]]
id = "good"
steps = [{ shrinker = "proguard", call-fallback-order = ["external"] }]

[[chain]]
id = "broken"
steps = [{ shrinker = "proguard", configuration-files = ["pg/fail.pro"], call-fallback-order = ["external"] }]
"#,
            );
            let report = shrink(&p.dir, &options(&p)).unwrap();

            assert_eq!(outcome(&report, "good"), Some(ChainOutcome::Replaced));
            assert!(matches!(
                outcome(&report, "broken"),
                Some(ChainOutcome::StepFailed { step, .. }) if step == "step-1-proguard"
            ));
            let outputs = report.outputs.as_ref().unwrap();
            assert_eq!(outputs.chain, "good");
            assert_eq!(
                outputs.processed_jar,
                p.step_dir("good", "step-1-proguard").join("out/app.jar")
            );
            assert!(p.dir.join("build/fluxo/report.json").is_file());
            assert!(matches!(
                report.check().unwrap_err(),
                EngineError::ChainsFailed { count: 1, .. }
            ));
        }

        #[test]
        fn proguard_then_r8_carries_mapping_and_merges_inputs() {
            let p = project_with(
                "application",
                "input-jars = [\"build/libs/dep.jar\"]",
                r#"
[[chain]]
id = "release"
steps = [
    { shrinker = "proguard", obfuscate = true, call-fallback-order = ["external"] },
    { shrinker = "r8", obfuscate = true, call-fallback-order = ["external"] },
]
"#,
            );
            write(&p.dir.join("build/libs/dep.jar"), "dependency classes");

            let report = shrink(&p.dir, &options(&p)).unwrap();
            report.check().unwrap();

            let first = p.step_dir("release", "step-1-proguard");
            let second = p.step_dir("release", "step-2-r8");
            assert!(first.join("out/app.jar").is_file());
            assert!(first.join("out/dep.jar").is_file());

            // R8 merges the forwarded dependency into the single output.
            let jars = std::fs::read_to_string(second.join("work/jars.pro")).unwrap();
            assert!(
                jars.contains(&format!("-injars '{}'", first.join("out/dep.jar").display())),
                "{jars}"
            );
            assert!(!jars.contains("-outjars"), "{jars}");
            let written: Vec<_> = std::fs::read_dir(second.join("out"))
                .unwrap()
                .map(|e| e.unwrap().file_name())
                .collect();
            assert_eq!(written, vec![std::ffi::OsString::from("app.jar")]);

            let root = std::fs::read_to_string(second.join("work/root.pro")).unwrap();
            assert!(
                root.contains(&format!(
                    "-applymapping '{}'",
                    first.join("reports/mapping.txt").display()
                )),
                "{root}"
            );
            let mapping = std::fs::read_to_string(second.join("reports/mapping.txt")).unwrap();
            assert!(mapping.contains("step-1-proguard"), "{mapping}");
            assert!(mapping.contains("step-2-r8"), "{mapping}");

            let outputs = report.outputs.unwrap();
            assert_eq!(outputs.processed_jar, second.join("out/app.jar"));
            assert_eq!(outputs.mapping, Some(second.join("reports/mapping.txt")));
            assert_eq!(report.chains.first().unwrap().steps.len(), 2);
        }

        #[test]
        fn r8_library_savings_count_only_processed_jars() {
            let p = project_with(
                "library",
                "input-jars = [\"build/libs/dep.jar\"]",
                r#"
[[chain]]
id = "release"
steps = [{ shrinker = "r8", call-fallback-order = ["external"] }]
"#,
            );
            write(&p.dir.join("build/libs/app.jar"), &"a".repeat(1000));
            write(&p.dir.join("build/libs/dep.jar"), &"d".repeat(9000));

            let report = shrink(&p.dir, &options(&p)).unwrap();
            report.check().unwrap();

            let step = report.chains.first().unwrap().steps.first().unwrap();
            assert_eq!(step.savings, SavingsReport::new(1000, 1000));
            assert_eq!(step.savings.verdict(), SavingsVerdict::Unchanged);
            let jars = std::fs::read_to_string(
                p.step_dir("release", "step-1-r8").join("work/jars.pro"),
            )
            .unwrap();
            assert!(
                jars.contains(&format!(
                    "-libraryjars '{}'",
                    p.dir.join("build/libs/dep.jar").display()
                )),
                "{jars}"
            );
        }

        #[test]
        fn missing_seeds_fail_only_that_chains_verification() {
            let p = project_with(
                "application",
                "",
                r#"
[[chain]]
id = "release"
steps = [{ shrinker = "proguard", call-fallback-order = ["external"] }]

[[chain]]
id = "quiet"
replace-outputs = false
steps = [{ shrinker = "proguard", configuration-files = ["pg/noseeds.pro"], call-fallback-order = ["external"] }]

[api]
dump = "api/app.api"
verify = true
"#,
            );
            write(&p.dir.join("api/app.api"), API_DUMP);

            let report = shrink(&p.dir, &options(&p)).unwrap();

            assert_eq!(outcome(&report, "release"), Some(ChainOutcome::Verified));
            let quiet = report.chains.iter().find(|c| c.chain == "quiet").unwrap();
            assert_eq!(quiet.outcome, ChainOutcome::ChainComplete);
            assert!(
                quiet
                    .verification_error
                    .as_deref()
                    .is_some_and(|e| e.contains("no seeds report")),
                "{quiet:?}"
            );
            let json = std::fs::read_to_string(p.dir.join("build/fluxo/report.json")).unwrap();
            assert!(json.contains("verification-error"), "{json}");
            assert!(matches!(
                report.check().unwrap_err(),
                EngineError::VerificationError { chain, .. } if chain == "quiet"
            ));
        }

        #[test]
        fn missing_main_jar_fails_before_running() {
            let p = project();
            std::fs::remove_file(p.dir.join("build/libs/app.jar")).unwrap();
            let err = shrink(&p.dir, &options(&p)).unwrap_err();
            assert!(matches!(err, EngineError::MissingInput { role: "main jar", .. }));
            assert!(!p.dir.join("build/fluxo/release").exists());
        }
    }
}
