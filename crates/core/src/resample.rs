//! Frame-rate conversion planned as (source pair, fraction) queries.
//!
//! Between every pair of source frames `expand = lcm(src, tgt) / src` slots are
//! implied; the superset of all slots is then sampled every
//! `stride = lcm / tgt` entries. A slot at fraction 0 is a plain copy of its
//! source frame.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::files::{self, FrameNaming};
use crate::fraction::{FRACTION_EPSILON, MAX_SPLIT_DEPTH};
use crate::oracle::FrameOracle;
use crate::precision;
use crate::progress::ProgressStack;
use crate::search::{SearchRequest, TargetSearch};
use crate::warnings::Warnings;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResampleQuery {
    pub before: PathBuf,
    pub after: PathBuf,
    pub fraction: f64,
    /// Index of `before` in the source list.
    pub source_index: usize,
}

impl ResampleQuery {
    pub fn is_passthrough(&self) -> bool {
        self.fraction == 0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResamplePlan {
    pub source_fps: u64,
    pub target_fps: u64,
    pub lcm: u64,
    pub expand: u64,
    pub stride: u64,
    /// Search depth after any power-of-two override.
    pub precision: u32,
    pub superset_len: usize,
    pub queries: Vec<ResampleQuery>,
    pub warnings: Warnings,
}

/// Build the sampled query list for converting `frames` from `source_fps` to `target_fps`.
///
/// The last source frame contributes only its passthrough slot, since no pair
/// follows it.
pub fn plan_resample(
    frames: &[PathBuf],
    source_fps: u64,
    target_fps: u64,
    precision: u32,
    time_step: bool,
) -> Result<ResamplePlan> {
    ensure!(source_fps > 0, "source frame rate must be positive");
    ensure!(target_fps > 0, "target frame rate must be positive");
    ensure!(
        precision <= MAX_SPLIT_DEPTH,
        "search precision {precision} exceeds the maximum of {MAX_SPLIT_DEPTH}"
    );

    let lcm = precision::lcm(source_fps, target_fps);
    let expand = lcm / source_fps;
    let stride = lcm / target_fps;
    let mut warnings = Warnings::new();

    let precision = match precision::exact_precision(expand) {
        Some(exact) if exact != precision => {
            info!(
                expand,
                requested = precision,
                precision = exact,
                "Search precision overridden for power-of-two expansion"
            );
            exact
        }
        _ => precision,
    };

    let mut superset = Vec::new();
    if let Some((last, pairs)) = frames.split_last() {
        for (j, before) in pairs.iter().enumerate() {
            let after = &frames[j + 1];
            for k in 0..expand {
                superset.push(ResampleQuery {
                    before: before.clone(),
                    after: after.clone(),
                    fraction: k as f64 / expand as f64,
                    source_index: j,
                });
            }
        }
        superset.push(ResampleQuery {
            before: last.clone(),
            after: last.clone(),
            fraction: 0.0,
            source_index: frames.len() - 1,
        });
    } else {
        warnings.push("no source frames to resample");
    }

    let superset_len = superset.len();
    let step = usize::try_from(stride).context("resample stride does not fit in memory")?;
    let queries: Vec<ResampleQuery> = superset.into_iter().step_by(step).collect();

    if !time_step {
        let mut fractions: Vec<f64> = queries
            .iter()
            .filter(|query| !query.is_passthrough())
            .map(|query| query.fraction)
            .collect();
        fractions.sort_by(f64::total_cmp);
        fractions.dedup();
        for collision in precision::colliding_targets(&fractions, precision) {
            warnings.push(format!(
                "precision {precision} resolves fractions {:?} to the same time {}",
                collision.targets, collision.hit
            ));
        }
    }

    debug!(
        source_fps,
        target_fps,
        lcm,
        expand,
        stride,
        superset = superset_len,
        queries = queries.len(),
        "Resample plan built"
    );
    Ok(ResamplePlan {
        source_fps,
        target_fps,
        lcm,
        expand,
        stride,
        precision,
        superset_len,
        queries,
        warnings,
    })
}

#[derive(Debug, Clone, Default)]
pub struct ResampleOutcome {
    pub outputs: Vec<PathBuf>,
    pub copied: usize,
    pub synthesized: usize,
    pub warnings: Warnings,
}

/// Executes a [`ResamplePlan`], writing one output per query.
pub struct Resampler<'a> {
    oracle: &'a mut dyn FrameOracle,
    progress: &'a mut ProgressStack,
    keep_samples: bool,
}

impl<'a> Resampler<'a> {
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

    pub fn run(
        &mut self,
        plan: &ResamplePlan,
        output_dir: &Path,
        base_name: &str,
        extension: &str,
    ) -> Result<ResampleOutcome> {
        let mut outcome = ResampleOutcome::default();
        if plan.queries.is_empty() {
            return Ok(outcome);
        }
        ensure!(
            plan.precision <= MAX_SPLIT_DEPTH,
            "search precision {} exceeds the maximum of {MAX_SPLIT_DEPTH}",
            plan.precision
        );
        files::ensure_dir(output_dir)?;

        let naming = FrameNaming::new(output_dir, base_name, extension);
        let width = files::index_width(plan.queries.len() - 1);

        info!(
            source_fps = plan.source_fps,
            target_fps = plan.target_fps,
            outputs = plan.queries.len(),
            precision = plan.precision,
            "Resampling series"
        );

        self.progress.push("resample", plan.queries.len() as u64);
        let result = self.run_queries(plan, &naming, width, &mut outcome);
        self.progress.pop();
        result?;
        Ok(outcome)
    }

    fn run_queries(
        &mut self,
        plan: &ResamplePlan,
        naming: &FrameNaming,
        width: usize,
        outcome: &mut ResampleOutcome,
    ) -> Result<()> {
        let use_time_step = self.oracle.supports_time_step();
        for (position, query) in plan.queries.iter().enumerate() {
            let output = naming.indexed_path(position, width);
            if query.is_passthrough() {
                files::copy_frame(&query.before, &output)?;
                outcome.copied += 1;
                self.progress.tick();
            } else if use_time_step {
                self.oracle
                    .time_step(&query.before, &query.after, query.fraction, &output)?;
                outcome.synthesized += 1;
                self.progress.tick();
            } else {
                let search_naming =
                    naming.with_base_name(format!("{}{position:0width$}", naming.base_name));
                let found = TargetSearch::new(&mut *self.oracle, &mut *self.progress)
                    .keep_samples(self.keep_samples)
                    .run(&SearchRequest {
                        before: &query.before,
                        after: &query.after,
                        min_target: (query.fraction - FRACTION_EPSILON).max(0.0),
                        max_target: (query.fraction + FRACTION_EPSILON).min(1.0),
                        depth: plan.precision,
                        naming: search_naming,
                    })?;
                files::move_frame(&found.path, &output)?;
                outcome.warnings.absorb(found.warnings);
                outcome.synthesized += 1;
            }
            outcome.outputs.push(output);
        }
        Ok(())
    }
}
