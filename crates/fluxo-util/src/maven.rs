//! Maven coordinates for shrinker distributions.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Maven Central repository URL (ProGuard is published here).
pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

/// Google's Maven repository (R8 is published here).
pub const GOOGLE_MAVEN: &str = "https://maven.google.com";

/// A `group:artifact:version` triple identifying one jar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MavenCoordinate {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl MavenCoordinate {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            group_id: group_id.to_owned(),
            artifact_id: artifact_id.to_owned(),
            version: version.to_owned(),
        }
    }

    /// Parse `"group:artifact:version"`.
    ///
    /// # Errors
    /// Returns `UtilError::InvalidMavenCoordinate` unless the string has exactly
    /// three non-empty colon-separated parts, or `UtilError::InvalidVersion`
    /// when the version is unsafe for use in paths.
    pub fn parse(coord: &str) -> Result<Self, UtilError> {
        let parts: Vec<&str> = coord.split(':').collect();
        let [group, artifact, version] = parts.as_slice() else {
            return Err(UtilError::InvalidMavenCoordinate {
                coordinate: coord.to_owned(),
                reason: format!(
                    "expected group:artifact:version, got {} part(s)",
                    parts.len()
                ),
            });
        };

        for (label, part) in [("group", group), ("artifact", artifact), ("version", version)] {
            if part.is_empty() {
                return Err(UtilError::InvalidMavenCoordinate {
                    coordinate: coord.to_owned(),
                    reason: format!("{label} is empty"),
                });
            }
        }
        crate::artifact::validate_version(version)?;

        Ok(Self::new(group, artifact, version))
    }

    /// `"{artifact_id}-{version}.jar"`.
    pub fn filename(&self) -> String {
        format!("{}-{}.jar", self.artifact_id, self.version)
    }

    fn group_path(&self) -> String {
        self.group_id.replace('.', "/")
    }

    /// Repository-relative path of the jar.
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.group_path(),
            self.artifact_id,
            self.version,
            self.filename()
        )
    }

    /// Download URL under `repository`, tolerating a trailing `/`.
    pub fn to_url(&self, repository: &str) -> String {
        format!(
            "{}/{}",
            repository.trim_end_matches('/'),
            self.repository_path()
        )
    }

    /// Location of the jar inside a local store rooted at `root`.
    pub fn store_path(&self, root: &Path) -> PathBuf {
        root.join(self.group_path())
            .join(&self.artifact_id)
            .join(&self.version)
            .join(self.filename())
    }
}

impl fmt::Display for MavenCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_proguard_coordinate() {
        let coord = MavenCoordinate::parse("com.guardsquare:proguard-base:7.6.1").unwrap();
        assert_eq!(coord.group_id, "com.guardsquare");
        assert_eq!(coord.artifact_id, "proguard-base");
        assert_eq!(coord.version, "7.6.1");
        assert_eq!(coord.to_string(), "com.guardsquare:proguard-base:7.6.1");
    }

    #[test]
    fn parse_rejects_wrong_arity() {
        let err = MavenCoordinate::parse("com.android.tools:r8").unwrap_err();
        assert!(err.to_string().contains("2 part(s)"), "{err}");
        assert!(MavenCoordinate::parse("a:b:c:d").is_err());
    }

    #[test]
    fn parse_rejects_empty_part() {
        let err = MavenCoordinate::parse("com.android.tools::8.5.35").unwrap_err();
        assert!(err.to_string().contains("artifact is empty"), "{err}");
    }

    #[test]
    fn parse_rejects_path_traversal_version() {
        assert!(MavenCoordinate::parse("com.android.tools:r8:../../etc").is_err());
    }

    #[test]
    fn r8_url_on_google_maven() {
        let coord = MavenCoordinate::new("com.android.tools", "r8", "8.5.35");
        assert_eq!(
            coord.to_url(&format!("{GOOGLE_MAVEN}/")),
            "https://maven.google.com/com/android/tools/r8/8.5.35/r8-8.5.35.jar"
        );
    }

    #[test]
    fn store_path_layout() {
        let coord = MavenCoordinate::new("com.guardsquare", "proguard-core", "9.1.6");
        assert_eq!(
            coord.store_path(Path::new("/home/u/.fluxo/tools")),
            Path::new("/home/u/.fluxo/tools/com/guardsquare/proguard-core/9.1.6/proguard-core-9.1.6.jar")
        );
    }
}
