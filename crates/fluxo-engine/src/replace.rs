//! Swap the project's published outputs for a chain's processed jar.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use fluxo_config::manifest::{ArtifactDecl, Manifest, Packaging, ProjectKind};

use crate::error::EngineError;
use crate::plan::resolve;

/// File recording the replaced outputs, under `<build-dir>/fluxo/`.
pub const OUTPUTS_FILE: &str = "outputs.json";

/// Whether `artifact` is a plain jar the shrunk jar can stand in for.
fn is_replaceable(artifact: &ArtifactDecl) -> bool {
    artifact.classifier.is_none() && artifact.kind == "jar" && artifact.extension == "jar"
}

/// Replace every unclassified jar artifact with `processed`.
///
/// Other artifacts (sources, javadoc, non-jar types) are kept. The result
/// has at most one artifact per `(name, classifier)`, so applying the same
/// replacement twice gives the same list.
pub fn replace_artifacts(
    artifacts: &[ArtifactDecl],
    processed: &Path,
    project_name: &str,
) -> Vec<ArtifactDecl> {
    let mut result: Vec<ArtifactDecl> = Vec::with_capacity(artifacts.len().max(1));
    let mut replaced_any = false;

    for artifact in artifacts {
        let next = if is_replaceable(artifact) {
            replaced_any = true;
            ArtifactDecl {
                file: processed.to_path_buf(),
                classifier: None,
                ..artifact.clone()
            }
        } else {
            artifact.clone()
        };
        if !result
            .iter()
            .any(|a| a.name == next.name && a.classifier == next.classifier)
        {
            result.push(next);
        }
    }

    if !replaced_any {
        result.push(ArtifactDecl {
            name: project_name.to_owned(),
            kind: "jar".to_owned(),
            extension: "jar".to_owned(),
            classifier: None,
            file: processed.to_path_buf(),
        });
    }
    result
}

/// Point packaging at the processed jar and its output directory.
pub fn repoint_packaging(processed: &Path) -> Packaging {
    Packaging {
        main_jar: processed.to_path_buf(),
        destination_dir: processed
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    }
}

/// What the replacement changed, written to `outputs.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputsRecord {
    pub chain: String,
    pub processed_jar: PathBuf,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactDecl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packaging: Option<Packaging>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<PathBuf>,
}

/// Installs one chain's output as the project's outputs, at most once per run.
#[derive(Debug, Default)]
pub struct ArtifactReplacer {
    installed: Mutex<Option<String>>,
}

impl ArtifactReplacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain whose outputs were installed, if any.
    pub fn installed_by(&self) -> Option<String> {
        self.installed.lock().ok().and_then(|g| g.clone())
    }

    /// Replace the project's outputs with `processed` and record the result
    /// under `run_root`.
    ///
    /// Applications with a `[packaging]` section get packaging re-pointed;
    /// everything else gets its artifact list replaced.
    ///
    /// # Errors
    /// Returns `AlreadyReplaced` if another chain already installed its
    /// outputs, or an error if the record cannot be written.
    pub fn install(
        &self,
        manifest: &Manifest,
        project_dir: &Path,
        chain: &str,
        processed: &Path,
        mapping: Option<&Path>,
        run_root: &Path,
    ) -> Result<OutputsRecord, EngineError> {
        let mut installed = self.installed.lock().map_err(|_| EngineError::Report {
            path: run_root.join(OUTPUTS_FILE).display().to_string(),
            message: "replacement state poisoned".to_owned(),
        })?;
        if let Some(previous) = installed.as_ref() {
            return Err(EngineError::AlreadyReplaced {
                chain: previous.clone(),
            });
        }

        let application = manifest.project.kind == ProjectKind::Application;
        let record = if application && manifest.packaging.is_some() {
            OutputsRecord {
                chain: chain.to_owned(),
                processed_jar: processed.to_path_buf(),
                artifacts: Vec::new(),
                packaging: Some(repoint_packaging(processed)),
                mapping: mapping.map(Path::to_path_buf),
            }
        } else {
            let declared: Vec<ArtifactDecl> = manifest
                .artifacts
                .iter()
                .map(|a| ArtifactDecl {
                    file: resolve(project_dir, &a.file),
                    ..a.clone()
                })
                .collect();
            OutputsRecord {
                chain: chain.to_owned(),
                processed_jar: processed.to_path_buf(),
                artifacts: replace_artifacts(&declared, processed, &manifest.project.name),
                packaging: None,
                mapping: mapping.map(Path::to_path_buf),
            }
        };

        write_record(&record, run_root)?;
        *installed = Some(chain.to_owned());
        tracing::info!(chain, jar = %processed.display(), "outputs replaced");
        Ok(record)
    }
}

fn write_record(record: &OutputsRecord, run_root: &Path) -> Result<(), EngineError> {
    fluxo_util::fs::ensure_dir(run_root)?;
    let path = run_root.join(OUTPUTS_FILE);
    let json = serde_json::to_string_pretty(record).map_err(|e| EngineError::Report {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    std::fs::write(&path, json).map_err(|e| EngineError::io(&path, e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn artifact(name: &str, classifier: Option<&str>, kind: &str, file: &str) -> ArtifactDecl {
        ArtifactDecl {
            name: name.to_owned(),
            kind: kind.to_owned(),
            extension: if kind == "jar" { "jar" } else { kind }.to_owned(),
            classifier: classifier.map(str::to_owned),
            file: PathBuf::from(file),
        }
    }

    #[test]
    fn replaces_plain_jar_and_keeps_others() {
        let processed = Path::new("/p/build/fluxo/release/step-1-proguard/out/demo.jar");
        let artifacts = vec![
            artifact("demo", None, "jar", "build/libs/demo.jar"),
            artifact("demo", Some("sources"), "jar", "build/libs/demo-sources.jar"),
            artifact("demo", None, "pom", "build/pom.xml"),
        ];
        let result = replace_artifacts(&artifacts, processed, "demo");
        assert_eq!(result.len(), 2);
        assert_eq!(result.first().unwrap().file, processed);
        assert_eq!(
            result.get(1).unwrap().classifier.as_deref(),
            Some("sources")
        );
    }

    #[test]
    fn duplicate_plain_jars_collapse() {
        let processed = Path::new("out/demo.jar");
        let artifacts = vec![
            artifact("demo", None, "jar", "a.jar"),
            artifact("demo", None, "jar", "b.jar"),
        ];
        let result = replace_artifacts(&artifacts, processed, "demo");
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn replacement_is_idempotent() {
        let processed = Path::new("out/demo.jar");
        let artifacts = vec![
            artifact("demo", None, "jar", "a.jar"),
            artifact("demo", Some("javadoc"), "jar", "d.jar"),
        ];
        let once = replace_artifacts(&artifacts, processed, "demo");
        let twice = replace_artifacts(&once, processed, "demo");
        assert_eq!(once, twice);
    }

    #[test]
    fn no_declared_artifacts_adds_processed_jar() {
        let result = replace_artifacts(&[], Path::new("out/demo.jar"), "demo");
        assert_eq!(result, vec![artifact("demo", None, "jar", "out/demo.jar")]);
    }

    #[test]
    fn packaging_points_at_out_dir() {
        let packaging = repoint_packaging(Path::new("/b/step-2-r8/out/app.jar"));
        assert_eq!(packaging.main_jar, PathBuf::from("/b/step-2-r8/out/app.jar"));
        assert_eq!(packaging.destination_dir, PathBuf::from("/b/step-2-r8/out"));
    }

    fn manifest(extra: &str, kind: &str) -> Manifest {
        Manifest::parse(
            &format!(
                "[project]\nname = \"demo\"\nkind = \"{kind}\"\nmain-jar = \"build/libs/demo.jar\"\n{extra}"
            ),
            Path::new("fluxo.toml"),
        )
        .unwrap()
    }

    #[test]
    fn install_writes_record_once() {
        let tmp = tempfile::tempdir().unwrap();
        let run_root = tmp.path().join("build").join("fluxo");
        let m = manifest(
            "[[artifact]]\nname = \"demo\"\nfile = \"build/libs/demo.jar\"\n",
            "library",
        );
        let replacer = ArtifactReplacer::new();
        let processed = run_root.join("release/step-1-proguard/out/demo.jar");

        let record = replacer
            .install(&m, tmp.path(), "release", &processed, None, &run_root)
            .unwrap();
        assert_eq!(record.artifacts.len(), 1);
        assert!(record.packaging.is_none());
        let json = std::fs::read_to_string(run_root.join(OUTPUTS_FILE)).unwrap();
        assert!(json.contains("\"chain\": \"release\""), "{json}");
        assert_eq!(replacer.installed_by().as_deref(), Some("release"));

        let err = replacer
            .install(&m, tmp.path(), "other", &processed, None, &run_root)
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyReplaced { chain } if chain == "release"));
    }

    #[test]
    fn application_with_packaging_is_repointed() {
        let tmp = tempfile::tempdir().unwrap();
        let m = manifest(
            "[packaging]\nmain-jar = \"build/libs/demo.jar\"\ndestination-dir = \"build/libs\"\n",
            "application",
        );
        let processed = tmp.path().join("out").join("demo.jar");
        let record = ArtifactReplacer::new()
            .install(&m, tmp.path(), "release", &processed, None, tmp.path())
            .unwrap();
        let packaging = record.packaging.unwrap();
        assert_eq!(packaging.main_jar, processed);
        assert_eq!(packaging.destination_dir, tmp.path().join("out"));
        assert!(record.artifacts.is_empty());
    }
}
