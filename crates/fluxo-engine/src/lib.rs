//! Chain planning, run orchestration, output replacement, keep-rule
//! generation and seeds verification for fluxo.

pub mod api;
pub mod error;
pub mod keep_rules;
pub mod pipeline;
pub mod plan;
pub mod replace;
pub mod savings;
pub mod seeds;

pub use error::EngineError;
pub use pipeline::{
    clean, keep_rules, plan_chains, shrink, verify, ChainOutcome, ChainReport, RunReport,
    ShrinkOptions, StepReport,
};
pub use plan::{ChainBuilder, ChainPlan, StepPlan};
pub use replace::ArtifactReplacer;
pub use savings::{SavingsReport, SavingsVerdict};
pub use seeds::{SeedsReport, VerificationDiff};
