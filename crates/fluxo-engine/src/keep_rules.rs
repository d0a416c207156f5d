//! Keep rules derived from the public API dump.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::api::{ApiClass, ApiDump, ApiMember, ClassKind};
use crate::error::EngineError;

/// File name of the generated rules under `<build-dir>/fluxo/`.
pub const KEEP_RULES_FILE: &str = "keep-rules.pro";

/// Member modifiers that narrow a ProGuard member specification.
const MEMBER_MODIFIERS: &[&str] = &["public", "protected", "static"];

/// Render one `-keep` block per class, retaining exactly the dumped members.
pub fn generate(dump: &ApiDump, source: &str) -> String {
    let mut out = format!("# Keep rules generated by fluxo from {source}\n");
    for class in &dump.classes {
        out.push('\n');
        render_class(&mut out, class);
    }
    out
}

fn render_class(out: &mut String, class: &ApiClass) {
    let keyword = match class.kind {
        ClassKind::Class => "class",
        ClassKind::Interface => "interface",
        ClassKind::Annotation => "@interface",
    };
    let access = if class.modifiers.iter().any(|m| m == "public") {
        "public "
    } else {
        ""
    };

    if class.members.is_empty() {
        let _ = writeln!(out, "-keep {access}{keyword} {}", class.name);
        return;
    }

    let _ = writeln!(out, "-keep {access}{keyword} {} {{", class.name);
    for member in &class.members {
        let mods = member
            .modifiers()
            .iter()
            .filter(|m| MEMBER_MODIFIERS.contains(&m.as_str()))
            .map(|m| format!("{m} "))
            .collect::<String>();
        let _ = match member {
            ApiMember::Constructor { params, .. } => {
                writeln!(out, "    {mods}<init>({});", params.join(", "))
            }
            ApiMember::Method {
                name,
                params,
                returns,
                ..
            } => writeln!(out, "    {mods}{returns} {name}({});", params.join(", ")),
            ApiMember::Field { name, ty, .. } => writeln!(out, "    {mods}{ty} {name};"),
        };
    }
    out.push_str("}\n");
}

/// Parse `api_dump` and write the rules to `<run_root>/keep-rules.pro`.
///
/// # Errors
/// Returns an error if the dump cannot be read or parsed, or the rule file
/// cannot be written.
pub fn write_keep_rules(api_dump: &Path, run_root: &Path) -> Result<PathBuf, EngineError> {
    let dump = ApiDump::from_path(api_dump)?;
    fluxo_util::fs::ensure_dir(run_root)?;
    let dest = run_root.join(KEEP_RULES_FILE);
    let text = generate(&dump, &api_dump.display().to_string());
    std::fs::write(&dest, text).map_err(|e| EngineError::io(&dest, e))?;
    tracing::debug!(classes = dump.classes.len(), dest = %dest.display(), "keep rules written");
    Ok(dest)
}
