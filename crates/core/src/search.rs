//! Binary-subdivision search for a frame at a target fractional time.
//!
//! Starting from the anchors at `0.0` and `1.0`, each step synthesizes the
//! midpoint of the current interval and descends into the half that holds the
//! centre of the target range, until a midpoint lands in range or the depth
//! budget runs out. Only the chosen frame survives the round.

use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use tracing::debug;

use crate::files::{self, FrameNaming};
use crate::fraction::{self, MAX_SPLIT_DEPTH};
use crate::oracle::FrameOracle;
use crate::progress::ProgressStack;
use crate::register::RegisteredFrame;
use crate::split::SubdivContext;
use crate::warnings::Warnings;

#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub before: &'a Path,
    pub after: &'a Path,
    pub min_target: f64,
    pub max_target: f64,
    pub depth: u32,
    /// Output directory and prefix for every frame this search writes.
    pub naming: FrameNaming,
}

impl SearchRequest<'_> {
    pub fn target_center(&self) -> f64 {
        (self.min_target + self.max_target) / 2.0
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.min_target.is_finite() && self.max_target.is_finite(),
            "target range must be finite"
        );
        ensure!(
            (0.0..=1.0).contains(&self.min_target) && (0.0..=1.0).contains(&self.max_target),
            "target range [{}, {}] must lie within [0, 1]",
            self.min_target,
            self.max_target
        );
        ensure!(
            self.min_target <= self.max_target,
            "min target {} exceeds max target {}",
            self.min_target,
            self.max_target
        );
        ensure!(
            self.depth <= MAX_SPLIT_DEPTH,
            "search depth {} exceeds the maximum of {MAX_SPLIT_DEPTH}",
            self.depth
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// The single surviving frame, named `<prefix>@<fraction>.<ext>`.
    pub path: PathBuf,
    pub fraction: f64,
    /// Whether `fraction` lies inside the requested range.
    pub hit: bool,
    /// Number of oracle calls made.
    pub midpoints: u32,
    pub warnings: Warnings,
}

pub struct TargetSearch<'a> {
    oracle: &'a mut dyn FrameOracle,
    progress: &'a mut ProgressStack,
    keep_samples: bool,
}

impl<'a> TargetSearch<'a> {
    pub fn new(oracle: &'a mut dyn FrameOracle, progress: &'a mut ProgressStack) -> Self {
        Self {
            oracle,
            progress,
            keep_samples: false,
        }
    }

    /// Keep every transient midpoint on disk instead of only the result.
    pub fn keep_samples(mut self, keep: bool) -> Self {
        self.keep_samples = keep;
        self
    }

    pub fn run(&mut self, request: &SearchRequest<'_>) -> Result<SearchOutcome> {
        request.validate()?;
        for anchor in [request.before, request.after] {
            if !anchor.is_file() {
                bail!("anchor frame not found: {}", anchor.display());
            }
        }
        files::ensure_dir(&request.naming.dir)?;

        if self.oracle.supports_time_step() {
            return self.run_time_step(request);
        }

        self.progress.push("search", u64::from(request.depth));
        let result = self.run_bisection(request);
        self.progress.pop();
        result
    }

    fn run_time_step(&mut self, request: &SearchRequest<'_>) -> Result<SearchOutcome> {
        let center = request.target_center();
        let output = request.naming.fractional_path(center);

        self.progress.push("search", 1);
        let written = if center <= 0.0 {
            files::copy_frame(request.before, &output).map(|_| 0)
        } else if center >= 1.0 {
            files::copy_frame(request.after, &output).map(|_| 0)
        } else {
            self.oracle
                .time_step(request.before, request.after, center, &output)
                .map(|_| 1)
        };
        if written.is_ok() {
            self.progress.tick();
        }
        self.progress.pop();

        debug!(fraction = center, "Placed frame directly with time step");
        Ok(SearchOutcome {
            path: output,
            fraction: center,
            hit: true,
            midpoints: written?,
            warnings: Warnings::new(),
        })
    }

    fn run_bisection(&mut self, request: &SearchRequest<'_>) -> Result<SearchOutcome> {
        let mut ctx = SubdivContext::new(request.depth);
        ctx.register.record(0.0, request.before);
        ctx.register.record(1.0, request.after);

        let mut midpoints = 0;
        self.descend(&mut ctx, request, 0.0, 1.0, &mut midpoints)?;
        debug_assert!(ctx.budget.is_balanced());

        self.isolate(&ctx, request, midpoints)
    }

    fn descend(
        &mut self,
        ctx: &mut SubdivContext,
        request: &SearchRequest<'_>,
        lo: f64,
        hi: f64,
        midpoints: &mut u32,
    ) -> Result<()> {
        if !ctx.budget.enter() {
            return Ok(());
        }
        let result = self.descend_entered(ctx, request, lo, hi, midpoints);
        ctx.budget.exit();
        result
    }

    fn descend_entered(
        &mut self,
        ctx: &mut SubdivContext,
        request: &SearchRequest<'_>,
        lo: f64,
        hi: f64,
        midpoints: &mut u32,
    ) -> Result<()> {
        let mid = lo + (hi - lo) / 2.0;
        let before = registered_path(ctx, lo)?;
        let after = registered_path(ctx, hi)?;
        let output = request.naming.fractional_path(mid);

        self.oracle.midpoint(&before, &after, &output)?;
        ctx.register.record(mid, output);
        *midpoints += 1;
        self.progress.tick();

        debug!(
            lo,
            hi,
            mid,
            depth = ctx.budget.current_depth(),
            "Search midpoint"
        );

        if fraction::in_range(mid, request.min_target, request.max_target) {
            return Ok(());
        }
        // Ties go to the lower half.
        if request.target_center() <= mid {
            self.descend(ctx, request, lo, mid, midpoints)
        } else {
            self.descend(ctx, request, mid, hi, midpoints)
        }
    }

    /// Keep one frame and remove the other transient ones.
    fn isolate(
        &mut self,
        ctx: &SubdivContext,
        request: &SearchRequest<'_>,
        midpoints: u32,
    ) -> Result<SearchOutcome> {
        let mut warnings = Warnings::new();
        let chosen = choose_result(ctx, request).context("search register is empty")?;
        let hit = fraction::in_range(chosen.fraction, request.min_target, request.max_target);
        if !hit {
            warnings.push(format!(
                "precision insufficient: target [{}, {}] not reachable within depth {}, using closest fraction {}",
                request.min_target, request.max_target, request.depth, chosen.fraction
            ));
        }

        let output = request.naming.fractional_path(chosen.fraction);
        // Anchors are caller-owned and never written by the search.
        let chose_anchor = chosen.path == request.before || chosen.path == request.after;
        if chose_anchor {
            files::copy_frame(&chosen.path, &output)?;
        }

        if !self.keep_samples {
            for frame in ctx.register.frames() {
                let is_anchor = frame.path == request.before || frame.path == request.after;
                if is_anchor || frame.path == output {
                    continue;
                }
                files::remove_frame(&frame.path)?;
            }
        }

        debug!(
            fraction = chosen.fraction,
            hit,
            midpoints,
            path = %output.display(),
            "Search finished"
        );
        Ok(SearchOutcome {
            path: output,
            fraction: chosen.fraction,
            hit,
            midpoints,
            warnings,
        })
    }
}

fn registered_path(ctx: &SubdivContext, at: f64) -> Result<PathBuf> {
    ctx.register
        .path_at(at)
        .map(Path::to_path_buf)
        .with_context(|| format!("no frame registered at {at}"))
}

/// The deepest frame when it landed in range, otherwise the registered frame
/// nearest the target centre (ties go to the later time).
fn choose_result(ctx: &SubdivContext, request: &SearchRequest<'_>) -> Option<RegisteredFrame> {
    let last = ctx.register.last()?;
    if fraction::in_range(last.fraction, request.min_target, request.max_target) {
        return Some(last.clone());
    }
    let center = request.target_center();
    ctx.register
        .frames()
        .iter()
        .min_by(|a, b| {
            let da = (a.fraction - center).abs();
            let db = (b.fraction - center).abs();
            da.total_cmp(&db).then(b.fraction.total_cmp(&a.fraction))
        })
        .cloned()
}
