//! Parse and validate `fluxo.toml` and `fluxo.lock`.

pub mod lockfile;
pub mod manifest;
pub mod step;

pub use lockfile::Lockfile;
pub use manifest::{Manifest, ManifestError, ProjectKind};
pub use step::{CallType, ChainConfig, ShrinkerKind, StepConfig};
