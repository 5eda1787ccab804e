//! Evenly spaced replacement frames between two anchors.
//!
//! For `count` frames the targets are `i / (count + 1)`. Each one is located
//! with a [`TargetSearch`] unless the oracle can place frames directly.

use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Result};
use tracing::debug;

use crate::files::{self, FrameNaming};
use crate::fraction::{FRACTION_EPSILON, MAX_SPLIT_DEPTH};
use crate::oracle::FrameOracle;
use crate::precision;
use crate::progress::ProgressStack;
use crate::search::{SearchRequest, TargetSearch};
use crate::warnings::Warnings;

#[derive(Debug, Clone)]
pub struct RestoreRequest<'a> {
    pub before: &'a Path,
    pub after: &'a Path,
    pub count: usize,
    pub precision: u32,
    /// Outputs are written as `<base><i>.<ext>` for `i` in `1..=count`.
    pub naming: FrameNaming,
}

impl RestoreRequest<'_> {
    pub fn targets(&self) -> Vec<f64> {
        let denominator = (self.count + 1) as f64;
        (1..=self.count).map(|i| i as f64 / denominator).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    /// Restored frames in ascending time order.
    pub frames: Vec<PathBuf>,
    /// Fraction each frame actually sits at.
    pub fractions: Vec<f64>,
    pub warnings: Warnings,
}

pub struct FrameRestorer<'a> {
    oracle: &'a mut dyn FrameOracle,
    progress: &'a mut ProgressStack,
    keep_samples: bool,
}

impl<'a> FrameRestorer<'a> {
    pub fn new(oracle: &'a mut dyn FrameOracle, progress: &'a mut ProgressStack) -> Self {
        Self {
            oracle,
            progress,
            keep_samples: false,
        }
    }

    pub fn keep_samples(mut self, keep: bool) -> Self {
        self.keep_samples = keep;
        self
    }

    pub fn run(&mut self, request: &RestoreRequest<'_>) -> Result<RestoreOutcome> {
        ensure!(request.count >= 1, "restore needs at least one frame");
        ensure!(
            request.precision <= MAX_SPLIT_DEPTH,
            "search precision {} exceeds the maximum of {MAX_SPLIT_DEPTH}",
            request.precision
        );
        for anchor in [request.before, request.after] {
            if !anchor.is_file() {
                bail!("anchor frame not found: {}", anchor.display());
            }
        }
        files::ensure_dir(&request.naming.dir)?;

        self.progress.push("restore", request.count as u64);
        let result = if self.oracle.supports_time_step() {
            self.run_time_step(request)
        } else {
            self.run_searches(request)
        };
        self.progress.pop();
        result
    }

    fn run_time_step(&mut self, request: &RestoreRequest<'_>) -> Result<RestoreOutcome> {
        let steps = u32::try_from(request.count + 1)?;
        let scratch = request
            .naming
            .with_base_name(format!("{}-steps", request.naming.base_name));
        let paths = self
            .oracle
            .multi(request.before, request.after, &scratch, steps)?;
        ensure!(
            paths.len() == request.count + 2,
            "oracle returned {} frames, expected {}",
            paths.len(),
            request.count + 2
        );

        let width = files::index_width(request.count);
        let mut outcome = RestoreOutcome::default();
        let last = paths.len() - 1;
        for (i, path) in paths.iter().enumerate() {
            if i == 0 || i == last {
                files::remove_frame(path)?;
                continue;
            }
            let target = request.naming.indexed_path(i, width);
            files::move_frame(path, &target)?;
            outcome.frames.push(target);
            outcome.fractions.push(i as f64 / steps as f64);
            self.progress.tick();
        }
        Ok(outcome)
    }

    fn run_searches(&mut self, request: &RestoreRequest<'_>) -> Result<RestoreOutcome> {
        let targets = request.targets();
        let mut outcome = RestoreOutcome::default();
        for collision in precision::colliding_targets(&targets, request.precision) {
            outcome.warnings.push(format!(
                "precision {} maps targets {:?} onto the same frame at {}",
                request.precision, collision.targets, collision.hit
            ));
        }

        let width = files::index_width(request.count);
        for (offset, &target) in targets.iter().enumerate() {
            let index = offset + 1;
            let search_naming = request
                .naming
                .with_base_name(format!("{}{index:0width$}", request.naming.base_name));
            let found = TargetSearch::new(&mut *self.oracle, &mut *self.progress)
                .keep_samples(self.keep_samples)
                .run(&SearchRequest {
                    before: request.before,
                    after: request.after,
                    min_target: (target - FRACTION_EPSILON).max(0.0),
                    max_target: (target + FRACTION_EPSILON).min(1.0),
                    depth: request.precision,
                    naming: search_naming,
                })?;

            let output = request.naming.indexed_path(index, width);
            files::move_frame(&found.path, &output)?;
            debug!(
                target,
                fraction = found.fraction,
                path = %output.display(),
                "Restored frame"
            );
            outcome.frames.push(output);
            outcome.fractions.push(found.fraction);
            outcome.warnings.absorb(found.warnings);
        }
        Ok(outcome)
    }
}
