//! Run one job per immediate sub-directory, collecting failures instead of
//! stopping at the first one.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tracing::{error, info};

use crate::files;

#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub input: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub processed: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
}

impl BatchSummary {
    /// `Err` listing every failed sub-directory, if any failed.
    pub fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            return Ok(());
        }
        let failed: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.input.display(), f.error))
            .collect();
        bail!(
            "{} of {} sub-directories failed:\n  {}",
            self.failures.len(),
            self.failures.len() + self.processed.len(),
            failed.join("\n  ")
        )
    }
}

/// Call `job(input_sub, output_sub)` for every sub-directory of `input_dir`,
/// mirroring its name under `output_dir`.
pub fn run_batch<F>(input_dir: &Path, output_dir: &Path, mut job: F) -> Result<BatchSummary>
where
    F: FnMut(&Path, &Path) -> Result<()>,
{
    let inputs = files::list_subdirectories(input_dir)?;
    if inputs.is_empty() {
        bail!("no sub-directories to process in {}", input_dir.display());
    }

    let mut summary = BatchSummary::default();
    for input in inputs {
        let name = files::file_name(&input)?.to_string();
        let output = output_dir.join(&name);
        info!(input = %input.display(), output = %output.display(), "Batch item");
        match job(&input, &output) {
            Ok(()) => summary.processed.push(input),
            Err(e) => {
                error!(input = %input.display(), "Batch item failed: {e:#}");
                summary.failures.push(BatchFailure {
                    input,
                    error: format!("{e:#}"),
                });
            }
        }
    }
    Ok(summary)
}
