//! Pairwise walk over an ordered frame list, one deep-interpolation round per pair.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Result};
use tracing::info;

use crate::deep::{DeepInterpolator, DeepRequest, Stitch};
use crate::files::{self, FrameNaming};
use crate::oracle::FrameOracle;
use crate::progress::ProgressStack;
use crate::warnings::Warnings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesMode {
    /// Offset 1: slow-motion inflation, shared anchors written once.
    Inflate,
    /// Offset of 2 or more: originals between the anchors are replaced.
    Resynthesize,
}

impl SeriesMode {
    pub fn from_offset(offset: usize) -> Result<Self> {
        ensure!(offset >= 1, "series offset must be at least 1");
        Ok(if offset == 1 {
            Self::Inflate
        } else {
            Self::Resynthesize
        })
    }
}

#[derive(Debug, Clone)]
pub struct SeriesRequest<'a> {
    pub frames: &'a [PathBuf],
    pub output_dir: &'a Path,
    pub base_name: &'a str,
    pub extension: &'a str,
    pub depth: u32,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SeriesOutcome {
    pub segments: usize,
    pub outputs: Vec<PathBuf>,
    pub warnings: Warnings,
}

pub struct SeriesInterpolator<'a> {
    oracle: &'a mut dyn FrameOracle,
    progress: &'a mut ProgressStack,
}

impl<'a> SeriesInterpolator<'a> {
    pub fn new(oracle: &'a mut dyn FrameOracle, progress: &'a mut ProgressStack) -> Self {
        Self { oracle, progress }
    }

    pub fn run(&mut self, request: &SeriesRequest<'_>) -> Result<SeriesOutcome> {
        let mode = SeriesMode::from_offset(request.offset)?;
        let mut outcome = SeriesOutcome::default();

        let count = request.frames.len();
        if count <= request.offset {
            outcome.warnings.push(format!(
                "series has {count} frame(s), need more than {} to form a pair; nothing to interpolate",
                request.offset
            ));
            return Ok(outcome);
        }
        files::ensure_dir(request.output_dir)?;

        let pairs = count - request.offset;
        let width = files::index_width(count);
        let naming = FrameNaming::new(request.output_dir, request.base_name, request.extension);

        info!(
            frames = count,
            pairs,
            depth = request.depth,
            mode = ?mode,
            output = %request.output_dir.display(),
            "Interpolating series"
        );

        self.progress.push("series", pairs as u64);
        let result = self.run_pairs(request, mode, &naming, width, &mut outcome);
        self.progress.pop();
        result?;

        outcome.segments = pairs;
        Ok(outcome)
    }

    fn run_pairs(
        &mut self,
        request: &SeriesRequest<'_>,
        mode: SeriesMode,
        naming: &FrameNaming,
        width: usize,
        outcome: &mut SeriesOutcome,
    ) -> Result<()> {
        for i in 0..request.frames.len() - request.offset {
            let (segment, stitch) = match mode {
                SeriesMode::Inflate if i == 0 => (i, Stitch::Normal),
                SeriesMode::Inflate => (i, Stitch::Continued),
                SeriesMode::Resynthesize => (i + 1, Stitch::Resynthesis),
            };
            let segment_naming =
                naming.with_base_name(format!("{}[{segment:0width$}]", naming.base_name));

            let round = DeepInterpolator::new(&mut *self.oracle, &mut *self.progress).run(
                &DeepRequest {
                    before: &request.frames[i],
                    after: &request.frames[i + request.offset],
                    depth: request.depth,
                    naming: segment_naming,
                    stitch,
                },
            )?;
            outcome.outputs.extend(round.outputs);
        }
        Ok(())
    }
}
