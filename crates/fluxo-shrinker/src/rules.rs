//! Generation of the two configuration files handed to the shrinker.
//!
//! `jars.pro` lists program, library and platform jars. `root.pro` includes
//! it and carries the step's directives plus every rule file. Both are plain
//! ProGuard syntax, which R8 reads as well.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::ShrinkerError;
use crate::jdk::JdkLibraries;
use crate::strategy::{JarLayout, ShrinkerStrategy};

/// Filter excluding multi-release class variants from library jars.
pub const MULTI_RELEASE_FILTER: &str = "(!META-INF/versions/**)";

/// Filter applied to JDK module files.
pub const JMOD_FILTER: &str = "(!**.jar;!module-info.class)";

/// Report files a step writes, all under its reports directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub mapping: PathBuf,
    pub seeds: PathBuf,
    pub usage: PathBuf,
    pub configuration: PathBuf,
}

impl ReportPaths {
    pub fn under(reports_dir: &Path) -> Self {
        Self {
            mapping: reports_dir.join("mapping.txt"),
            seeds: reports_dir.join("seeds.txt"),
            usage: reports_dir.join("usage.txt"),
            configuration: reports_dir.join("final-config.pro"),
        }
    }
}

/// Contents of `jars.pro`.
#[derive(Debug, Clone)]
pub struct JarsConfig<'a> {
    pub layout: &'a JarLayout,
    pub library_jars: &'a [PathBuf],
    /// Platform classes; `None` when the tool takes the JDK on its command line.
    pub jdk: Option<(&'a JdkLibraries, &'a [PathBuf])>,
    pub filter_multi_release: bool,
}

impl JarsConfig<'_> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for pair in &self.layout.program {
            let _ = writeln!(out, "-injars {}", quote(&pair.input));
            if let Some(output) = &pair.output {
                let _ = writeln!(out, "-outjars {}", quote(output));
            }
        }

        let filter = if self.filter_multi_release {
            MULTI_RELEASE_FILTER
        } else {
            ""
        };
        for lib in self
            .layout
            .passthrough_libraries
            .iter()
            .chain(self.library_jars)
        {
            let _ = writeln!(out, "-libraryjars {}{filter}", quote(lib));
        }

        if let Some((kind, files)) = self.jdk {
            let jdk_filter = match kind {
                JdkLibraries::Jmods(_) => JMOD_FILTER,
                JdkLibraries::RtJar(_) => "",
            };
            for file in files {
                let _ = writeln!(out, "-libraryjars {}{jdk_filter}", quote(file));
            }
        }
        out
    }
}

/// Contents of `root.pro`.
#[derive(Debug, Clone, Default)]
pub struct RootConfig {
    pub optimize: bool,
    pub obfuscate: bool,
    /// Mapping from earlier steps to continue obfuscating from.
    pub apply_mapping: Option<PathBuf>,
    pub main_class: Option<String>,
    /// User, default and generated rule files, included in order.
    pub rule_files: Vec<PathBuf>,
}

impl RootConfig {
    pub fn render(&self, jars_config: &Path, reports: &ReportPaths) -> String {
        let mut out = String::from("# Generated by fluxo. Changes are overwritten on every run.\n");
        let _ = writeln!(out, "-include {}", quote(jars_config));

        if self.obfuscate {
            let _ = writeln!(out, "-printmapping {}", quote(&reports.mapping));
        } else {
            out.push_str("-dontobfuscate\n");
        }
        if !self.optimize {
            out.push_str("-dontoptimize\n");
        }
        if let Some(mapping) = &self.apply_mapping {
            let _ = writeln!(out, "-applymapping {}", quote(mapping));
        }
        let _ = writeln!(out, "-printseeds {}", quote(&reports.seeds));
        let _ = writeln!(out, "-printusage {}", quote(&reports.usage));
        let _ = writeln!(out, "-printconfiguration {}", quote(&reports.configuration));

        if let Some(main_class) = &self.main_class {
            let _ = writeln!(
                out,
                "-keep public class {main_class} {{\n    public static void main(java.lang.String[]);\n}}"
            );
        }

        for file in &self.rule_files {
            let _ = writeln!(out, "-include {}", quote(file));
        }
        out
    }
}

/// Paths of the written configuration files.
#[derive(Debug, Clone)]
pub struct WrittenConfigs {
    pub jars: PathBuf,
    pub root: PathBuf,
}

/// Write `jars.pro` and `root.pro` into `work_dir`.
///
/// # Errors
/// Returns an error if the directory or either file cannot be written.
pub fn write_configs(
    work_dir: &Path,
    jars: &JarsConfig<'_>,
    root: &RootConfig,
    reports: &ReportPaths,
) -> Result<WrittenConfigs, ShrinkerError> {
    fluxo_util::fs::ensure_dir(work_dir)?;
    let jars_path = work_dir.join("jars.pro");
    let root_path = work_dir.join("root.pro");

    std::fs::write(&jars_path, jars.render())
        .map_err(|source| fluxo_util::error::UtilError::io(&jars_path, source))?;
    std::fs::write(&root_path, root.render(&jars_path, reports))
        .map_err(|source| fluxo_util::error::UtilError::io(&root_path, source))?;

    tracing::debug!(root = %root_path.display(), "shrinker configuration written");
    Ok(WrittenConfigs {
        jars: jars_path,
        root: root_path,
    })
}

/// Rule files for a step: the explicit list when given, otherwise the
/// strategy's well-known files that exist under `project_dir`. Explicit
/// entries may be glob patterns such as `proguard/*.pro`.
///
/// # Errors
/// Returns `MissingRuleFile` for an explicit file that does not exist.
pub fn resolve_rule_files(
    strategy: &dyn ShrinkerStrategy,
    explicit: &[PathBuf],
    project_dir: &Path,
) -> Result<Vec<PathBuf>, ShrinkerError> {
    if explicit.is_empty() {
        return Ok(strategy
            .default_rule_files()
            .iter()
            .map(|f| project_dir.join(f))
            .filter(|p| p.is_file())
            .collect());
    }

    let mut files = Vec::new();
    for f in explicit {
        let raw = f.to_string_lossy();
        if raw.contains(['*', '?', '[']) {
            let matched = fluxo_util::fs::glob_files(project_dir, &raw)?;
            if matched.is_empty() {
                return Err(ShrinkerError::MissingRuleFile {
                    path: project_dir.join(f),
                });
            }
            files.extend(matched);
            continue;
        }
        let path = if f.is_absolute() {
            f.clone()
        } else {
            project_dir.join(f)
        };
        if !path.is_file() {
            return Err(ShrinkerError::MissingRuleFile { path });
        }
        files.push(path);
    }
    Ok(files)
}

fn quote(path: &Path) -> String {
    format!("'{}'", path.display())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::strategy::{ProGuard, R8};

    #[test]
    fn jars_config_pairs_injars_with_outjars() {
        let layout = ProGuard.layout(
            Path::new("/p/app.jar"),
            &[PathBuf::from("/p/dep.jar")],
            Path::new("/out"),
            false,
        );
        let jdk = JdkLibraries::Jmods(PathBuf::from("/jdk/jmods"));
        let jmods = vec![PathBuf::from("/jdk/jmods/java.base.jmod")];
        let text = JarsConfig {
            layout: &layout,
            library_jars: &[PathBuf::from("/p/compile.jar")],
            jdk: Some((&jdk, &jmods)),
            filter_multi_release: true,
        }
        .render();

        assert_eq!(
            text,
            "-injars '/p/app.jar'\n\
             -outjars '/out/app.jar'\n\
             -injars '/p/dep.jar'\n\
             -outjars '/out/dep.jar'\n\
             -libraryjars '/p/compile.jar'(!META-INF/versions/**)\n\
             -libraryjars '/jdk/jmods/java.base.jmod'(!**.jar;!module-info.class)\n"
        );
    }

    #[test]
    fn r8_jars_config_has_no_outjars() {
        let layout = R8.layout(Path::new("app.jar"), &[], Path::new("out"), true);
        let text = JarsConfig {
            layout: &layout,
            library_jars: &[],
            jdk: None,
            filter_multi_release: false,
        }
        .render();
        assert_eq!(text, "-injars 'app.jar'\n");
    }

    #[test]
    fn multi_release_filter_optional() {
        let layout = ProGuard.layout(Path::new("app.jar"), &[], Path::new("out"), false);
        let text = JarsConfig {
            layout: &layout,
            library_jars: &[PathBuf::from("lib.jar")],
            jdk: None,
            filter_multi_release: false,
        }
        .render();
        assert!(text.contains("-libraryjars 'lib.jar'\n"));
    }

    #[test]
    fn root_config_without_obfuscation() {
        let reports = ReportPaths::under(Path::new("/r"));
        let text = RootConfig {
            optimize: true,
            obfuscate: false,
            apply_mapping: None,
            main_class: Some("com.example.MainKt".to_owned()),
            rule_files: vec![PathBuf::from("/p/pg/rules.pro")],
        }
        .render(Path::new("/w/jars.pro"), &reports);

        assert!(text.contains("-include '/w/jars.pro'\n"));
        assert!(text.contains("-dontobfuscate\n"));
        assert!(!text.contains("-dontoptimize"));
        assert!(!text.contains("-printmapping"));
        assert!(text.contains("-printseeds '/r/seeds.txt'\n"));
        assert!(text.contains("-printusage '/r/usage.txt'\n"));
        assert!(text.contains("-printconfiguration '/r/final-config.pro'\n"));
        assert!(text.contains("-keep public class com.example.MainKt {"));
        assert!(text.ends_with("-include '/p/pg/rules.pro'\n"));
    }

    #[test]
    fn root_config_with_mapping() {
        let reports = ReportPaths::under(Path::new("r"));
        let text = RootConfig {
            optimize: false,
            obfuscate: true,
            apply_mapping: Some(PathBuf::from("prev/mapping.txt")),
            ..RootConfig::default()
        }
        .render(Path::new("jars.pro"), &reports);

        assert!(text.contains("-printmapping 'r/mapping.txt'\n"));
        assert!(text.contains("-applymapping 'prev/mapping.txt'\n"));
        assert!(text.contains("-dontoptimize\n"));
        assert!(!text.contains("-dontobfuscate"));
        assert!(!text.contains("-keep "));
    }

    #[test]
    fn default_rule_files_only_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("pg")).unwrap();
        std::fs::write(tmp.path().join("pg/rules.pro"), "-keep class *").unwrap();

        let files = resolve_rule_files(&R8, &[], tmp.path()).unwrap();
        assert_eq!(files, vec![tmp.path().join("pg/rules.pro")]);
    }

    #[test]
    fn explicit_rule_files_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("custom.pro"), "").unwrap();
        std::fs::create_dir_all(tmp.path().join("pg")).unwrap();
        std::fs::write(tmp.path().join("pg/rules.pro"), "").unwrap();

        let files =
            resolve_rule_files(&ProGuard, &[PathBuf::from("custom.pro")], tmp.path()).unwrap();
        assert_eq!(files, vec![tmp.path().join("custom.pro")]);

        let err = resolve_rule_files(&ProGuard, &[PathBuf::from("absent.pro")], tmp.path())
            .unwrap_err()
            .to_string();
        assert!(err.contains("absent.pro"), "{err}");
    }

    #[test]
    fn explicit_rule_patterns_expand() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("proguard")).unwrap();
        std::fs::write(tmp.path().join("proguard/b.pro"), "").unwrap();
        std::fs::write(tmp.path().join("proguard/a.pro"), "").unwrap();
        std::fs::write(tmp.path().join("proguard/notes.txt"), "").unwrap();

        let files =
            resolve_rule_files(&ProGuard, &[PathBuf::from("proguard/*.pro")], tmp.path()).unwrap();
        assert_eq!(
            files,
            vec![tmp.path().join("proguard/a.pro"), tmp.path().join("proguard/b.pro")]
        );

        let err = resolve_rule_files(&ProGuard, &[PathBuf::from("missing/*.pro")], tmp.path())
            .unwrap_err();
        assert!(matches!(err, ShrinkerError::MissingRuleFile { .. }));
    }

    #[test]
    fn write_configs_creates_both_files() {
        let tmp = tempfile::tempdir().unwrap();
        let work = tmp.path().join("work");
        let layout = ProGuard.layout(Path::new("app.jar"), &[], Path::new("out"), false);
        let written = write_configs(
            &work,
            &JarsConfig {
                layout: &layout,
                library_jars: &[],
                jdk: None,
                filter_multi_release: true,
            },
            &RootConfig::default(),
            &ReportPaths::under(&tmp.path().join("reports")),
        )
        .unwrap();

        assert_eq!(written.jars, work.join("jars.pro"));
        let root = std::fs::read_to_string(&written.root).unwrap();
        assert!(root.contains(&format!("-include '{}'", written.jars.display())));
    }
}
