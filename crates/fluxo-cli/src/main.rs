#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fluxo_config::{Lockfile, Manifest, ShrinkerKind};
use fluxo_engine::{ChainOutcome, ShrinkOptions};
use fluxo_shrinker::{jdk, strategy_for, ToolResolver};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "fluxo", about = "Shrink, optimize and obfuscate JVM artifacts with ProGuard and R8")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the configured shrinker chains
    Shrink {
        /// Run only this chain
        #[arg(long)]
        chain: Option<String>,
        /// Show tool output and debug logs
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Require every tool jar to be pinned in fluxo.lock; never download
        #[arg(long)]
        locked: bool,
        /// Keep going when a tool exits with a non-zero code
        #[arg(long)]
        no_exit_check: bool,
    },
    /// Print the resolved plan of each chain without running anything
    Plan {
        /// Plan only this chain
        #[arg(long)]
        chain: Option<String>,
    },
    /// Generate keep rules from the public API dump
    KeepRules,
    /// Check the seeds of each chain against the public API dump
    Verify {
        /// Verify only this chain
        #[arg(long)]
        chain: Option<String>,
    },
    /// Remove fluxo's build outputs
    Clean,
    /// Check the JDK and shrinker tool setup
    Doctor,
}

fn main() {
    let cli = Cli::parse();
    let verbose = matches!(cli.command, Command::Shrink { verbose: true, .. });
    init_tracing(verbose);

    let result = match cli.command {
        Command::Shrink {
            chain,
            verbose,
            locked,
            no_exit_check,
        } => cmd_shrink(chain, verbose, locked, !no_exit_check),
        Command::Plan { chain } => cmd_plan(chain.as_deref()),
        Command::KeepRules => cmd_keep_rules(),
        Command::Verify { chain } => cmd_verify(chain.as_deref()),
        Command::Clean => cmd_clean(),
        Command::Doctor => cmd_doctor(),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

/// Log filter from `FLUXO_LOG`, defaulting to warnings (debug with `--verbose`).
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("FLUXO_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Find the project root by looking for `fluxo.toml` in the current directory.
fn project_root() -> Result<PathBuf, Box<dyn Error>> {
    let cwd = std::env::current_dir()?;
    if !cwd.join("fluxo.toml").exists() {
        return Err("no fluxo.toml found in current directory".into());
    }
    Ok(cwd)
}

fn cmd_shrink(chain: Option<String>, verbose: bool, locked: bool, check_exit: bool) -> CliResult {
    let root = project_root()?;
    let options = ShrinkOptions {
        chain,
        verbose,
        locked,
        check_exit,
        tool_store: None,
    };

    let report = fluxo_engine::shrink(&root, &options)?;

    if let Some(rules) = &report.keep_rules {
        eprintln!("    Keep rules at {}", rules.display());
    }
    for chain in &report.chains {
        for warning in &chain.warnings {
            eprintln!("warning: {warning}");
        }
        match &chain.outcome {
            ChainOutcome::StepFailed { step, error } => {
                eprintln!("      Failed chain `{}` at {step}: {error}", chain.chain);
            }
            ChainOutcome::ChainComplete => {
                eprintln!("    Finished chain `{}`", chain.chain);
            }
            ChainOutcome::Replaced => {
                eprintln!("    Finished chain `{}` (outputs replaced)", chain.chain);
            }
            ChainOutcome::Verified => {
                eprintln!("    Finished chain `{}` (seeds verified)", chain.chain);
            }
        }
        if let Some(error) = &chain.verification_error {
            eprintln!("      Verification of chain `{}` failed: {error}", chain.chain);
        }
        if let Some(output) = &chain.output {
            eprintln!("             {}", output.display());
        }
    }
    eprintln!(
        "    Finished {} chain(s) in {:.2}s",
        report.chains.len(),
        report.duration.as_secs_f64()
    );

    report.check()?;
    Ok(())
}

fn cmd_plan(chain: Option<&str>) -> CliResult {
    let root = project_root()?;
    let plans = fluxo_engine::plan_chains(&root, chain)?;

    for plan in &plans {
        println!(
            "chain `{}`{}",
            plan.chain_id,
            if plan.replace_outputs { " (replaces outputs)" } else { "" }
        );
        for step in &plan.steps {
            let mut flags = Vec::new();
            if step.optimize {
                flags.push("optimize");
            }
            if step.obfuscate {
                flags.push("obfuscate");
            }
            if step.full_mode {
                flags.push("full-mode");
            }
            if step.tail {
                flags.push("tail");
            }
            let order = step
                .call_order
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" > ");
            println!("  {} [{}] calls: {order}", step.label(), flags.join(", "));
            println!("    in:  {}", relative(&root, &step.main_jar_in));
            println!("    out: {}", relative(&root, &step.main_jar_out));
            if let Some(mapping) = &step.apply_mapping {
                println!("    applies mapping {}", relative(&root, mapping));
            }
            for rules in &step.rule_files {
                println!("    rules {}", relative(&root, rules));
            }
        }
        for warning in &plan.warnings {
            println!("  warning: {warning}");
        }
    }
    Ok(())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

fn cmd_keep_rules() -> CliResult {
    let root = project_root()?;
    let path = fluxo_engine::keep_rules(&root)?;
    eprintln!("    Generated {}", path.display());
    Ok(())
}

fn cmd_verify(chain: Option<&str>) -> CliResult {
    let root = project_root()?;
    let results = fluxo_engine::verify(&root, chain)?;

    let mut mismatched = Vec::new();
    for result in &results {
        if result.diff.is_clean() {
            eprintln!("  [ok] {}", result.chain);
        } else {
            eprintln!("  [!!] {}", result.chain);
            for line in result.diff.to_string().lines() {
                eprintln!("       {line}");
            }
            mismatched.push(result.chain.as_str());
        }
    }

    if mismatched.is_empty() {
        Ok(())
    } else {
        Err(format!("seeds do not match the API dump for: {}", mismatched.join(", ")).into())
    }
}

fn cmd_clean() -> CliResult {
    let root = project_root()?;
    if fluxo_engine::clean(&root)? {
        eprintln!("    Cleaned shrinker outputs");
    } else {
        eprintln!("    Nothing to clean");
    }
    Ok(())
}

fn cmd_doctor() -> CliResult {
    eprintln!("Checking environment...");
    eprintln!();

    let mut issues = 0u32;
    let cwd = std::env::current_dir()?;
    let manifest = if cwd.join("fluxo.toml").exists() {
        match Manifest::from_path(&cwd.join("fluxo.toml")) {
            Ok(m) => {
                eprintln!("  [ok] Project: {}", m.project.name);
                Some(m)
            }
            Err(e) => {
                eprintln!("  [!!] fluxo.toml: {e}");
                issues = issues.saturating_add(1);
                None
            }
        }
    } else {
        eprintln!("  [--] No fluxo.toml in current directory");
        None
    };

    // JDK: home, launcher and platform classes.
    let configured = manifest
        .as_ref()
        .and_then(|m| m.project.jdk_home.as_ref())
        .map(|p| if p.is_absolute() { p.clone() } else { cwd.join(p) });
    match jdk::detect_jdk(configured.as_deref()) {
        Ok(info) => {
            eprintln!("  [ok] JDK: {}", info.home.display());
            match jdk::query_version(&info) {
                Ok(version) => match jdk::major_version(&version) {
                    Some(major) if major < 8 => {
                        eprintln!("  [!!] java: {version}; ProGuard and R8 need Java 8 or newer");
                        issues = issues.saturating_add(1);
                    }
                    _ => eprintln!("  [ok] java: {version}"),
                },
                Err(e) => {
                    eprintln!("  [!!] java: {e}");
                    issues = issues.saturating_add(1);
                }
            }
            eprintln!("  [ok] Platform classes: {}", info.libraries.path().display());
        }
        Err(e) => {
            eprintln!("  [!!] JDK: {e}");
            issues = issues.saturating_add(1);
        }
    }

    // Tools: configured local jars and the managed store.
    let store = fluxo_shrinker::toolchain::tools_dir()?;
    let lockfile = Lockfile::from_path(&cwd.join("fluxo.lock"))?;
    for kind in [ShrinkerKind::ProGuard, ShrinkerKind::R8] {
        let tool = manifest.as_ref().and_then(|m| m.tools.for_kind(kind));
        let local = tool.map(|t| t.resolved(&cwd));
        if let Some(jars) = local.as_ref().map(|t| &t.jars).filter(|j| !j.is_empty()) {
            let missing: Vec<_> = jars.iter().filter(|j| !j.is_file()).collect();
            if missing.is_empty() {
                eprintln!("  [ok] {kind}: {} local jar(s)", jars.len());
            } else {
                for jar in &missing {
                    eprintln!("  [!!] {kind}: local jar not found: {}", jar.display());
                }
                issues = issues.saturating_add(1);
            }
        }

        match ToolResolver::coordinates(strategy_for(kind), tool) {
            Ok(coords) => {
                for coord in &coords {
                    let key = coord.to_string();
                    let stored = coord.store_path(&store).is_file();
                    let pinned = lockfile.sha256_for(&key).is_some();
                    match (stored, pinned) {
                        (true, true) => eprintln!("  [ok] {key} (stored, pinned)"),
                        (true, false) => eprintln!("  [ok] {key} (stored, not pinned)"),
                        (false, _) => eprintln!(
                            "  [--] {key} not downloaded; will download on first bundled run"
                        ),
                    }
                }
            }
            Err(e) => {
                eprintln!("  [!!] {kind}: {e}");
                issues = issues.saturating_add(1);
            }
        }
    }

    eprintln!();
    if issues > 0 {
        eprintln!("{issues} issue(s) found; fix them before shrinking");
        Err(format!("{issues} issue(s) found").into())
    } else {
        eprintln!("All checks passed");
        Ok(())
    }
}
