//! Exhaustive bisection between two anchors, followed by integerization.
//!
//! A round of depth `d` produces every dyadic time `k / 2^d` between the
//! anchors, then renames the fractional scratch files to integer indices.

use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use tracing::debug;

use crate::files::{self, FrameNaming};
use crate::fraction::{self, MAX_SPLIT_DEPTH};
use crate::oracle::FrameOracle;
use crate::progress::ProgressStack;
use crate::split::SubdivContext;

/// How a round's output is stitched to its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stitch {
    /// Keep every position `0..=2^d`.
    Normal,
    /// Drop position 0, which repeats the previous round's last frame.
    Continued,
    /// Drop both anchors and keep only synthesized frames.
    Resynthesis,
}

impl Stitch {
    fn retains(self, position: usize, last: usize) -> bool {
        match self {
            Self::Normal => true,
            Self::Continued => position != 0,
            Self::Resynthesis => position != 0 && position != last,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeepRequest<'a> {
    pub before: &'a Path,
    pub after: &'a Path,
    pub depth: u32,
    pub naming: FrameNaming,
    pub stitch: Stitch,
}

#[derive(Debug, Clone, Default)]
pub struct DeepOutcome {
    /// Integer-indexed outputs in ascending time order.
    pub outputs: Vec<PathBuf>,
    /// Frames produced by the oracle in this round.
    pub synthesized: usize,
}

pub struct DeepInterpolator<'a> {
    oracle: &'a mut dyn FrameOracle,
    progress: &'a mut ProgressStack,
}

impl<'a> DeepInterpolator<'a> {
    pub fn new(oracle: &'a mut dyn FrameOracle, progress: &'a mut ProgressStack) -> Self {
        Self { oracle, progress }
    }

    pub fn run(&mut self, request: &DeepRequest<'_>) -> Result<DeepOutcome> {
        ensure!(
            request.depth <= MAX_SPLIT_DEPTH,
            "depth {} exceeds the maximum of {MAX_SPLIT_DEPTH}",
            request.depth
        );
        ensure!(
            request.depth < usize::BITS - 1,
            "depth {} would produce too many frames",
            request.depth
        );
        for anchor in [request.before, request.after] {
            if !anchor.is_file() {
                bail!("anchor frame not found: {}", anchor.display());
            }
        }
        files::ensure_dir(&request.naming.dir)?;

        let steps = 1usize << request.depth;
        let mut ctx = SubdivContext::new(request.depth);

        self.progress
            .push(format!("depth {}", request.depth), (steps - 1) as u64);
        let synthesized = self.synthesize(&mut ctx, request, steps);
        self.progress.pop();
        let synthesized = synthesized?;
        debug_assert!(ctx.budget.is_balanced());

        let outputs = integerize(&ctx, request, steps)?;
        debug!(
            depth = request.depth,
            synthesized,
            outputs = outputs.len(),
            stitch = ?request.stitch,
            "Deep interpolation round finished"
        );
        Ok(DeepOutcome {
            outputs,
            synthesized,
        })
    }

    fn synthesize(
        &mut self,
        ctx: &mut SubdivContext,
        request: &DeepRequest<'_>,
        steps: usize,
    ) -> Result<usize> {
        if request.depth > 0 && self.oracle.supports_time_step() {
            let steps_u32 = u32::try_from(steps).context("too many time steps for one call")?;
            let paths = self
                .oracle
                .multi(request.before, request.after, &request.naming, steps_u32)?;
            ensure!(
                paths.len() == steps + 1,
                "oracle returned {} frames, expected {}",
                paths.len(),
                steps + 1
            );
            for (i, path) in paths.into_iter().enumerate() {
                ctx.register.record(i as f64 / steps as f64, path);
                if i > 0 && i < steps {
                    self.progress.tick();
                }
            }
            return Ok(steps - 1);
        }

        let first = request.naming.fractional_path(0.0);
        let last = request.naming.fractional_path(1.0);
        files::copy_frame(request.before, &first)?;
        files::copy_frame(request.after, &last)?;
        ctx.register.record(0.0, first);
        ctx.register.record(1.0, last);

        let mut synthesized = 0;
        self.split(ctx, request, 0.0, 1.0, &mut synthesized)?;
        Ok(synthesized)
    }

    fn split(
        &mut self,
        ctx: &mut SubdivContext,
        request: &DeepRequest<'_>,
        lo: f64,
        hi: f64,
        synthesized: &mut usize,
    ) -> Result<()> {
        if !ctx.budget.enter() {
            return Ok(());
        }
        let result = self.split_entered(ctx, request, lo, hi, synthesized);
        ctx.budget.exit();
        result
    }

    fn split_entered(
        &mut self,
        ctx: &mut SubdivContext,
        request: &DeepRequest<'_>,
        lo: f64,
        hi: f64,
        synthesized: &mut usize,
    ) -> Result<()> {
        let mid = lo + (hi - lo) / 2.0;
        let before = ctx
            .register
            .path_at(lo)
            .map(Path::to_path_buf)
            .with_context(|| format!("no frame registered at {lo}"))?;
        let after = ctx
            .register
            .path_at(hi)
            .map(Path::to_path_buf)
            .with_context(|| format!("no frame registered at {hi}"))?;

        let output = request.naming.fractional_path(mid);
        self.oracle.midpoint(&before, &after, &output)?;
        ctx.register.record(mid, output);
        *synthesized += 1;
        self.progress.tick();

        self.split(ctx, request, lo, mid, synthesized)?;
        self.split(ctx, request, mid, hi, synthesized)
    }
}

/// Rename the round's fractional files to `<base><position>.<ext>`, dropping
/// the positions the stitch mode excludes.
fn integerize(ctx: &SubdivContext, request: &DeepRequest<'_>, steps: usize) -> Result<Vec<PathBuf>> {
    let sorted = ctx.register.sorted();
    ensure!(
        sorted.len() == steps + 1,
        "round registered {} frames, expected {}",
        sorted.len(),
        steps + 1
    );

    let width = files::index_width(steps);
    let mut outputs = Vec::with_capacity(sorted.len());
    for (position, frame) in sorted.iter().enumerate() {
        check_scratch_name(&frame.path, &request.naming.base_name, position as f64 / steps as f64)?;
        if request.stitch.retains(position, steps) {
            let target = request.naming.indexed_path(position, width);
            files::move_frame(&frame.path, &target)?;
            outputs.push(target);
        } else {
            files::remove_frame(&frame.path)?;
        }
    }
    Ok(outputs)
}

/// The scratch file at a position must carry this round's prefix and the
/// position's time, otherwise the lexical order cannot be trusted.
fn check_scratch_name(path: &Path, base_name: &str, expected: f64) -> Result<()> {
    let name = files::file_name(path)?;
    match fraction::parse_fractional_name(name) {
        Some((prefix, value))
            if prefix == base_name && fraction::encode(value) == fraction::encode(expected) =>
        {
            Ok(())
        }
        _ => bail!("scratch frame {name} does not sit at {expected} of round {base_name}"),
    }
}
