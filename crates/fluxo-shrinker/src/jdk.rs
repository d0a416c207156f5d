//! JDK discovery and validation.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ShrinkerError;

/// Platform classes the shrinker resolves library references against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JdkLibraries {
    /// `<home>/jmods` of a modular JDK (9+).
    Jmods(PathBuf),
    /// `rt.jar` of a JDK 8 installation.
    RtJar(PathBuf),
}

impl JdkLibraries {
    pub fn path(&self) -> &Path {
        match self {
            Self::Jmods(p) | Self::RtJar(p) => p,
        }
    }
}

/// A validated JDK installation.
#[derive(Debug, Clone)]
pub struct JdkInfo {
    pub home: PathBuf,
    /// The `java` launcher.
    pub java: PathBuf,
    pub libraries: JdkLibraries,
}

impl JdkInfo {
    /// Every `.jmod` file (or the single `rt.jar`), sorted.
    ///
    /// # Errors
    /// Returns an error if the jmods directory cannot be read.
    pub fn library_files(&self) -> Result<Vec<PathBuf>, ShrinkerError> {
        match &self.libraries {
            JdkLibraries::Jmods(dir) => Ok(fluxo_util::fs::collect_files(dir, "jmod")?),
            JdkLibraries::RtJar(jar) => Ok(vec![jar.clone()]),
        }
    }
}

/// Locate and validate the JDK.
///
/// Resolution order:
/// 1. `configured` (the manifest's `jdk-home`)
/// 2. `JAVA_HOME` environment variable
///
/// # Errors
/// Returns an error if no home is configured, or the home lacks a `java`
/// launcher or platform classes.
pub fn detect_jdk(configured: Option<&Path>) -> Result<JdkInfo, ShrinkerError> {
    let home = match configured {
        Some(p) => p.to_path_buf(),
        None => std::env::var_os("JAVA_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .ok_or(ShrinkerError::JdkNotConfigured)?,
    };
    validate_home(&home)
}

/// Validate `home` as a JDK installation.
///
/// # Errors
/// Returns `JdkInvalid` naming what is missing.
pub fn validate_home(home: &Path) -> Result<JdkInfo, ShrinkerError> {
    if !home.is_dir() {
        return Err(invalid(home, "directory does not exist"));
    }

    let java = home.join("bin").join(java_binary_name());
    if !java.is_file() {
        return Err(invalid(home, "bin/java not found"));
    }
    check_executable(home, &java)?;

    let libraries = find_libraries(home)
        .ok_or_else(|| invalid(home, "neither jmods/ nor jre/lib/rt.jar found"))?;

    tracing::debug!(home = %home.display(), libraries = %libraries.path().display(), "JDK detected");
    Ok(JdkInfo {
        home: home.to_path_buf(),
        java,
        libraries,
    })
}

fn invalid(home: &Path, reason: &str) -> ShrinkerError {
    ShrinkerError::JdkInvalid {
        path: home.to_path_buf(),
        reason: reason.to_owned(),
    }
}

fn java_binary_name() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

fn find_libraries(home: &Path) -> Option<JdkLibraries> {
    let jmods = home.join("jmods");
    if jmods.is_dir() {
        return Some(JdkLibraries::Jmods(jmods));
    }
    [home.join("jre").join("lib").join("rt.jar"), home.join("lib").join("rt.jar")]
        .into_iter()
        .find(|p| p.is_file())
        .map(JdkLibraries::RtJar)
}

fn check_executable(home: &Path, java: &Path) -> Result<(), ShrinkerError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata =
            std::fs::metadata(java).map_err(|_| invalid(home, "bin/java is not readable"))?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(invalid(home, "bin/java is not executable"));
        }
    }
    #[cfg(not(unix))]
    let _ = (home, java);
    Ok(())
}

/// Run `java -version` and extract the version string.
///
/// # Errors
/// Returns an error if java cannot be run or prints no recognizable version.
pub fn query_version(jdk: &JdkInfo) -> Result<String, ShrinkerError> {
    let output = fluxo_util::process::run_command(Command::new(&jdk.java).arg("-version"))?;

    // `java -version` prints to stderr.
    let raw = if output.stderr.trim().is_empty() {
        output.stdout.trim().to_owned()
    } else {
        output.stderr.trim().to_owned()
    };

    parse_version(&raw).ok_or(ShrinkerError::JavaVersion { output: raw })
}

/// Parse a version from `java -version` output.
///
/// Handles formats like:
/// - `openjdk version "21.0.2" 2024-01-16`
/// - `java version "1.8.0_392"`
/// - `openjdk version "17" 2021-09-14`
pub fn parse_version(raw: &str) -> Option<String> {
    let first = raw.lines().next()?;
    let start = first.find('"')?;
    let rest = first.get(start + 1..)?;
    let end = rest.find('"')?;
    let version = rest.get(..end)?;
    let looks_numeric = version
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit());
    looks_numeric.then(|| version.to_owned())
}

/// Major Java version of a parsed version string (`1.8.0_392` is 8).
pub fn major_version(version: &str) -> Option<u32> {
    let mut parts = version.split(['.', '_', '-', '+']);
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(first)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fake_jdk(root: &Path, modular: bool) {
        let bin = root.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let java = bin.join(java_binary_name());
        std::fs::write(&java, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        if modular {
            std::fs::create_dir_all(root.join("jmods")).unwrap();
            std::fs::write(root.join("jmods").join("java.base.jmod"), b"jmod").unwrap();
        } else {
            std::fs::create_dir_all(root.join("jre").join("lib")).unwrap();
            std::fs::write(root.join("jre").join("lib").join("rt.jar"), b"rt").unwrap();
        }
    }

    #[test]
    fn modular_jdk_uses_jmods() {
        let tmp = tempfile::tempdir().unwrap();
        fake_jdk(tmp.path(), true);
        let jdk = validate_home(tmp.path()).unwrap();
        assert!(matches!(jdk.libraries, JdkLibraries::Jmods(_)));
        let files = jdk.library_files().unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn jdk8_falls_back_to_rt_jar() {
        let tmp = tempfile::tempdir().unwrap();
        fake_jdk(tmp.path(), false);
        let jdk = validate_home(tmp.path()).unwrap();
        assert_eq!(
            jdk.libraries,
            JdkLibraries::RtJar(tmp.path().join("jre").join("lib").join("rt.jar"))
        );
    }

    #[test]
    fn missing_home_is_invalid() {
        let err = validate_home(Path::new("/nonexistent/jdk")).unwrap_err();
        assert!(matches!(err, ShrinkerError::JdkInvalid { .. }));
        assert!(err.to_string().contains("/nonexistent/jdk"));
    }

    #[test]
    fn home_without_platform_classes_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        fake_jdk(tmp.path(), true);
        std::fs::remove_dir_all(tmp.path().join("jmods")).unwrap();
        let err = validate_home(tmp.path()).unwrap_err().to_string();
        assert!(err.contains("jmods"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_java_is_invalid() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        fake_jdk(tmp.path(), true);
        let java = tmp.path().join("bin").join("java");
        std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o644)).unwrap();
        let err = validate_home(tmp.path()).unwrap_err().to_string();
        assert!(err.contains("not executable"), "{err}");
    }

    #[test]
    fn parse_version_formats() {
        assert_eq!(
            parse_version("openjdk version \"21.0.2\" 2024-01-16\nOpenJDK Runtime"),
            Some("21.0.2".to_owned())
        );
        assert_eq!(
            parse_version("java version \"1.8.0_392\""),
            Some("1.8.0_392".to_owned())
        );
        assert_eq!(parse_version("no version here"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn major_versions() {
        assert_eq!(major_version("21.0.2"), Some(21));
        assert_eq!(major_version("1.8.0_392"), Some(8));
        assert_eq!(major_version("17"), Some(17));
        assert_eq!(major_version("abc"), None);
    }
}
