//! Input vs. output size accounting for a step.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::EngineError;

/// How a step changed the size of its jars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavingsVerdict {
    Reduced,
    Unchanged,
    Increased,
}

/// Bytes going into and coming out of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SavingsReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl SavingsReport {
    pub fn new(input_bytes: u64, output_bytes: u64) -> Self {
        Self {
            input_bytes,
            output_bytes,
        }
    }

    /// Measure `inputs` against everything the step wrote to `out_dir`.
    ///
    /// # Errors
    /// Returns an error if a file's size cannot be read.
    pub fn measure(inputs: &[PathBuf], out_dir: &Path) -> Result<Self, EngineError> {
        Ok(Self::new(
            fluxo_util::fs::files_size(inputs)?,
            fluxo_util::fs::dir_size(out_dir)?,
        ))
    }

    pub fn verdict(&self) -> SavingsVerdict {
        match self.output_bytes.cmp(&self.input_bytes) {
            std::cmp::Ordering::Less => SavingsVerdict::Reduced,
            std::cmp::Ordering::Equal => SavingsVerdict::Unchanged,
            std::cmp::Ordering::Greater => SavingsVerdict::Increased,
        }
    }

    /// Size difference relative to the input, in tenths of a percent.
    fn per_mille(&self) -> u64 {
        let diff = self.input_bytes.abs_diff(self.output_bytes);
        diff.saturating_mul(1000)
            .checked_div(self.input_bytes)
            .unwrap_or(0)
    }

    fn percent(&self) -> String {
        let pm = self.per_mille();
        format!("{}.{}%", pm / 10, pm % 10)
    }

    /// Log the result: size growth at error level, no change as a warning.
    pub fn log(&self, chain: &str, step: &str) {
        match self.verdict() {
            SavingsVerdict::Increased => tracing::error!(chain, step, "{self}"),
            SavingsVerdict::Unchanged => tracing::warn!(chain, step, "{self}"),
            SavingsVerdict::Reduced => tracing::info!(chain, step, "{self}"),
        }
    }
}

impl fmt::Display for SavingsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (input, output) = (self.input_bytes, self.output_bytes);
        match self.verdict() {
            SavingsVerdict::Reduced => write!(
                f,
                "{input} -> {output} bytes, saved {}",
                self.percent()
            ),
            SavingsVerdict::Unchanged => write!(f, "{input} -> {output} bytes, no savings"),
            SavingsVerdict::Increased => write!(
                f,
                "{input} -> {output} bytes, size INCREASED by {}",
                self.percent()
            ),
        }
    }
}
