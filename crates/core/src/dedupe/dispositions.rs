//! What to do with a duplicate report: print it, drop the duplicates, refill
//! them with synthesized frames, or sweep the detection threshold.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use super::analyzer::{analyze, DuplicateGroup, DuplicateReport};
use super::detector::DuplicateDetector;
use crate::files::{self, FrameNaming};
use crate::fraction::MAX_SPLIT_DEPTH;
use crate::oracle::FrameOracle;
use crate::progress::ProgressStack;
use crate::restore::{FrameRestorer, RestoreRequest};
use crate::warnings::Warnings;

pub fn render_report(report: &DuplicateReport) -> String {
    report.render()
}

/// Whether a group falls under an optional size limit (`0` = no limit).
fn within_limit(group: &DuplicateGroup, max_size: usize) -> bool {
    max_size == 0 || group.len() <= max_size
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOutcome {
    pub copied: Vec<PathBuf>,
    pub removed: usize,
    pub skipped_groups: usize,
}

/// Copy every non-duplicate frame into `output_dir`.
///
/// Groups larger than `max_size_for_delete` (`0` = no limit) are copied intact.
pub fn delete_duplicates(
    frames: &[PathBuf],
    report: &DuplicateReport,
    output_dir: &Path,
    max_size_for_delete: usize,
) -> Result<DeleteOutcome> {
    ensure!(
        report.total_frames == frames.len(),
        "report covers {} frames but {} were given",
        report.total_frames,
        frames.len()
    );
    ensure_distinct_output(frames, output_dir)?;
    files::ensure_dir(output_dir)?;

    let mut outcome = DeleteOutcome::default();
    let mut dropped = BTreeSet::new();
    for group in &report.groups {
        if within_limit(group, max_size_for_delete) {
            dropped.extend(group.duplicates().map(|(index, _)| index));
        } else {
            outcome.skipped_groups += 1;
        }
    }

    for (index, frame) in frames.iter().enumerate() {
        if dropped.contains(&index) {
            outcome.removed += 1;
            continue;
        }
        let target = output_dir.join(files::file_name(frame)?);
        files::copy_frame(frame, &target)?;
        outcome.copied.push(target);
    }

    info!(
        copied = outcome.copied.len(),
        removed = outcome.removed,
        skipped_groups = outcome.skipped_groups,
        output = %output_dir.display(),
        "Duplicates removed"
    );
    Ok(outcome)
}

/// Fail when `output_dir` resolves to a directory the frames are read from.
fn ensure_distinct_output(frames: &[PathBuf], output_dir: &Path) -> Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }
    let output = fs::canonicalize(output_dir)
        .with_context(|| format!("failed to resolve {}", output_dir.display()))?;

    let sources: BTreeSet<&Path> = frames
        .iter()
        .map(|frame| match frame.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        })
        .collect();
    for source in sources {
        let resolved = fs::canonicalize(source)
            .with_context(|| format!("failed to resolve {}", source.display()))?;
        if resolved == output {
            bail!(
                "output directory {} is the input directory; choose a different output",
                output_dir.display()
            );
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AutofillOptions {
    /// Groups larger than this are left untouched (`0` = no limit).
    pub ignore_over_size: usize,
    pub precision: u32,
    pub keep_samples: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AutofillOutcome {
    pub filled_groups: usize,
    pub filled_frames: usize,
    pub skipped_groups: usize,
    pub warnings: Warnings,
}

/// Replace every duplicate with a frame restored between the group's keep
/// frame and the source frame right after the group.
///
/// The output directory ends up with the same file names as the input. The
/// frame after a group is taken from the raw source list even when it is
/// itself a duplicate of something.
pub fn autofill(
    oracle: &mut dyn FrameOracle,
    progress: &mut ProgressStack,
    frames: &[PathBuf],
    report: &DuplicateReport,
    output_dir: &Path,
    options: &AutofillOptions,
) -> Result<AutofillOutcome> {
    ensure!(
        options.precision <= MAX_SPLIT_DEPTH,
        "search precision {} exceeds the maximum of {MAX_SPLIT_DEPTH}",
        options.precision
    );
    let deleted = delete_duplicates(frames, report, output_dir, options.ignore_over_size)?;
    let mut outcome = AutofillOutcome {
        skipped_groups: deleted.skipped_groups,
        ..Default::default()
    };

    let scratch_root = output_dir.join(format!(".frameweave-scratch-{}", std::process::id()));
    let eligible: Vec<&DuplicateGroup> = report
        .groups
        .iter()
        .filter(|group| within_limit(group, options.ignore_over_size))
        .collect();

    progress.push("autofill", eligible.len() as u64);
    let result = fill_groups(
        oracle,
        progress,
        frames,
        &eligible,
        output_dir,
        &scratch_root,
        options,
        &mut outcome,
    );
    progress.pop();
    if scratch_root.exists() {
        if let Err(e) = fs::remove_dir_all(&scratch_root) {
            warn!(dir = %scratch_root.display(), error = %e, "Failed to remove scratch directory");
        }
    }
    result?;

    info!(
        filled_groups = outcome.filled_groups,
        filled_frames = outcome.filled_frames,
        skipped_groups = outcome.skipped_groups,
        "Autofill finished"
    );
    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn fill_groups(
    oracle: &mut dyn FrameOracle,
    progress: &mut ProgressStack,
    frames: &[PathBuf],
    groups: &[&DuplicateGroup],
    output_dir: &Path,
    scratch_root: &Path,
    options: &AutofillOptions,
    outcome: &mut AutofillOutcome,
) -> Result<()> {
    for (number, group) in groups.iter().enumerate() {
        let after_index = group.last_index() + 1;
        let keep = group.keep().context("duplicate group is empty")?;

        let Some(after) = frames.get(after_index) else {
            outcome.warnings.push(format!(
                "duplicate group {}..={} has no following frame to interpolate towards; originals kept",
                group.keep_index(),
                group.last_index()
            ));
            for (_, duplicate) in group.duplicates() {
                files::copy_frame(duplicate, &output_dir.join(files::file_name(duplicate)?))?;
            }
            outcome.skipped_groups += 1;
            progress.tick();
            continue;
        };

        let extension = keep
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png");
        let naming = FrameNaming::new(scratch_root.join(format!("group-{number}")), "fill", extension);
        let restored = FrameRestorer::new(&mut *oracle, &mut *progress)
            .keep_samples(options.keep_samples)
            .run(&RestoreRequest {
                before: keep,
                after,
                count: group.len() - 1,
                precision: options.precision,
                naming,
            })?;
        outcome.warnings.absorb(restored.warnings);

        for ((_, duplicate), fill) in group.duplicates().zip(&restored.frames) {
            files::move_frame(fill, &output_dir.join(files::file_name(duplicate)?))?;
            outcome.filled_frames += 1;
        }
        outcome.filled_groups += 1;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct TuneRange {
    pub min: u32,
    pub max: u32,
    pub step: u32,
}

impl TuneRange {
    pub fn thresholds(&self) -> Result<Vec<u32>> {
        ensure!(self.step > 0, "tune step must be positive");
        Ok((self.min..self.max).step_by(self.step as usize).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TuneRow {
    pub threshold: u32,
    pub dupe_percent: f64,
    pub max_group: usize,
    pub dupe_count: usize,
    pub first_dupe: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TuneTable {
    pub rows: Vec<TuneRow>,
    pub warnings: Warnings,
}

impl TuneTable {
    pub fn to_csv(&self) -> String {
        let mut out = String::from("threshold,dupe_percent,max_group,dupe_count,first_dupe\n");
        for row in &self.rows {
            let first = row.first_dupe.map(|i| i.to_string()).unwrap_or_default();
            let _ = writeln!(
                out,
                "{},{:.4},{},{},{first}",
                row.threshold, row.dupe_percent, row.max_group, row.dupe_count
            );
        }
        out
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{:>10} {:>12} {:>10} {:>10} {:>10}\n",
            "threshold", "dupe_pct", "max_group", "dupes", "first_dupe"
        );
        for row in &self.rows {
            let first = row
                .first_dupe
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:>10} {:>11.2}% {:>10} {:>10} {:>10}",
                row.threshold, row.dupe_percent, row.max_group, row.dupe_count, first
            );
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            files::ensure_dir(parent)?;
        }
        fs::write(path, self.to_csv())
            .with_context(|| format!("failed to write CSV: {}", path.display()))
    }
}

/// Analyze `frames` once per threshold in `range`.
pub fn tune(
    detector: &mut dyn DuplicateDetector,
    progress: &mut ProgressStack,
    frames: &[PathBuf],
    range: TuneRange,
    max_dupes: usize,
) -> Result<TuneTable> {
    let thresholds = range.thresholds()?;
    let mut table = TuneTable::default();
    if thresholds.is_empty() {
        table.warnings.push(format!(
            "tuning range [{}, {}) is empty; no thresholds evaluated",
            range.min, range.max
        ));
        return Ok(table);
    }

    progress.push("tune", thresholds.len() as u64);
    let result = (|| -> Result<()> {
        for threshold in thresholds {
            let report = analyze(detector, frames, threshold, max_dupes)?;
            table.rows.push(TuneRow {
                threshold,
                dupe_percent: report.dupe_percent,
                max_group: report.max_group,
                dupe_count: report.dupe_count,
                first_dupe: report.first_dupe,
            });
            progress.tick();
        }
        Ok(())
    })();
    progress.pop();
    result?;
    Ok(table)
}
