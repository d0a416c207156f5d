//! Seeds report parsing and verification against the API dump.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::api::{ApiDump, ApiMember};
use crate::error::EngineError;

/// Normalized signatures the shrinker kept, as printed by `-printseeds`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedsReport {
    signatures: BTreeSet<String>,
}

impl SeedsReport {
    /// Parse `-printseeds` output. Blank lines, comments and static
    /// initializers are skipped; `<init>` lines become constructor signatures.
    pub fn parse(text: &str) -> Self {
        Self {
            signatures: text.lines().filter_map(normalize).collect(),
        }
    }

    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    /// The signatures a shrinker keeping exactly `dump` would print.
    pub fn from_api(dump: &ApiDump) -> Self {
        let mut signatures = BTreeSet::new();
        for class in &dump.classes {
            signatures.insert(class.name.clone());
            for member in &class.members {
                let sig = match member {
                    ApiMember::Constructor { params, .. } => {
                        format!("{}: {}({})", class.name, class.simple_name(), params.join(","))
                    }
                    ApiMember::Method {
                        name,
                        params,
                        returns,
                        ..
                    } => format!("{}: {returns} {name}({})", class.name, params.join(",")),
                    ApiMember::Field { name, ty, .. } => format!("{}: {ty} {name}", class.name),
                };
                signatures.insert(sig);
            }
        }
        Self { signatures }
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.signatures.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(String::as_str)
    }
}

impl fmt::Display for SeedsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sig in &self.signatures {
            writeln!(f, "{sig}")?;
        }
        Ok(())
    }
}

fn normalize(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line: String = line
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(", ", ",");

    let Some((class, member)) = line.split_once(": ") else {
        return Some(line);
    };
    if member.contains("<clinit>(") {
        return None;
    }
    if let Some(pos) = member.find("<init>(") {
        let args = member.get(pos + "<init>".len()..).unwrap_or("()");
        let simple = class.rsplit('.').next().unwrap_or(class);
        return Some(format!("{class}: {simple}{args}"));
    }
    Some(line)
}

/// Symbols that differ between the seeds and the API dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationDiff {
    /// Public API the shrinker did not keep.
    pub missing: Vec<String>,
    /// Kept symbols the API dump does not declare.
    pub unexpected: Vec<String>,
}

impl VerificationDiff {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

impl fmt::Display for VerificationDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sig in &self.missing {
            writeln!(f, "- {sig}")?;
        }
        for sig in &self.unexpected {
            writeln!(f, "+ {sig}")?;
        }
        Ok(())
    }
}

/// Compare what the shrinker kept against what the API declares.
pub fn verify(seeds: &SeedsReport, expected: &SeedsReport) -> VerificationDiff {
    VerificationDiff {
        missing: expected
            .signatures
            .difference(&seeds.signatures)
            .cloned()
            .collect(),
        unexpected: seeds
            .signatures
            .difference(&expected.signatures)
            .cloned()
            .collect(),
    }
}
