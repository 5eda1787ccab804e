use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use serde::Serialize;
use tracing::info;

use super::detector::{DuplicateDetector, Verdict};
use crate::files;
use crate::warnings::Warnings;

/// A contiguous run of near-identical frames keyed by source index.
///
/// The lowest index is the keep frame; the rest duplicate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    frames: BTreeMap<usize, PathBuf>,
}

impl DuplicateGroup {
    fn from_run(frames: &[PathBuf], start: usize, len: usize) -> Self {
        Self {
            frames: (start..start + len)
                .map(|index| (index, frames[index].clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn keep_index(&self) -> usize {
        self.frames.keys().next().copied().unwrap_or_default()
    }

    pub fn last_index(&self) -> usize {
        self.frames.keys().next_back().copied().unwrap_or_default()
    }

    pub fn keep(&self) -> Option<&Path> {
        self.frames.values().next().map(PathBuf::as_path)
    }

    /// Duplicate frames after the keep frame, in source order.
    pub fn duplicates(&self) -> impl Iterator<Item = (usize, &Path)> {
        self.frames
            .iter()
            .skip(1)
            .map(|(index, path)| (*index, path.as_path()))
    }

    pub fn frames(&self) -> &BTreeMap<usize, PathBuf> {
        &self.frames
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub threshold: u32,
    pub max_dupes: usize,
    pub total_frames: usize,
    pub groups: Vec<DuplicateGroup>,
    /// Frames marked as duplicates, keep frames excluded.
    pub dupe_count: usize,
    /// `dupe_count` as a percentage of `total_frames`.
    pub dupe_percent: f64,
    pub max_group: usize,
    pub first_dupe: Option<usize>,
    pub warnings: Warnings,
}

impl DuplicateReport {
    fn new(
        threshold: u32,
        max_dupes: usize,
        total_frames: usize,
        groups: Vec<DuplicateGroup>,
        warnings: Warnings,
    ) -> Self {
        let dupe_count: usize = groups.iter().map(|g| g.len() - 1).sum();
        let dupe_percent = if total_frames == 0 {
            0.0
        } else {
            100.0 * dupe_count as f64 / total_frames as f64
        };
        let max_group = groups.iter().map(DuplicateGroup::len).max().unwrap_or(0);
        let first_dupe = groups.iter().map(|g| g.keep_index() + 1).min();
        Self {
            threshold,
            max_dupes,
            total_frames,
            groups,
            dupe_count,
            dupe_percent,
            max_group,
            first_dupe,
            warnings,
        }
    }

    /// Human-readable summary, one line per group plus totals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let cap = if self.max_dupes == 0 {
            "unlimited".to_string()
        } else {
            self.max_dupes.to_string()
        };
        let _ = writeln!(
            out,
            "Duplicate report: {} frame(s), threshold {}, max group size {cap}",
            self.total_frames, self.threshold
        );
        for (number, group) in self.groups.iter().enumerate() {
            let keep = group.keep().map(display_name).unwrap_or_default();
            let dupes: Vec<String> = group
                .duplicates()
                .map(|(index, path)| format!("{index}:{}", display_name(path)))
                .collect();
            let _ = writeln!(
                out,
                "  group {}: keep {}:{keep}, duplicates [{}]",
                number + 1,
                group.keep_index(),
                dupes.join(", ")
            );
        }
        let first = self
            .first_dupe
            .map(|index| index.to_string())
            .unwrap_or_else(|| "none".to_string());
        let _ = writeln!(
            out,
            "groups: {}, dupe_count: {}, dupe_percent: {:.2}%, max_group: {}, first_dupe: {first}",
            self.groups.len(),
            self.dupe_count,
            self.dupe_percent,
            self.max_group
        );
        out
    }
}

fn display_name(path: &Path) -> String {
    files::file_name(path)
        .map(str::to_string)
        .unwrap_or_else(|_| path.display().to_string())
}

/// Fold a verdict stream into groups of at least two frames.
///
/// A run that would grow past `max_dupes` frames (keep included) is closed and
/// the next verdict starts a fresh run; `0` means no cap.
pub fn group_verdicts(
    frames: &[PathBuf],
    verdicts: &[Verdict],
    max_dupes: usize,
) -> Result<(Vec<DuplicateGroup>, Warnings)> {
    ensure!(
        frames.len() == verdicts.len(),
        "detector returned {} verdicts for {} frames",
        verdicts.len(),
        frames.len()
    );

    let mut groups = Vec::new();
    let mut warnings = Warnings::new();
    let mut capped = 0usize;
    let mut run_start = 0usize;
    let mut run_len = 0usize;

    let close = |start: usize, len: usize, groups: &mut Vec<DuplicateGroup>| {
        if len >= 2 {
            groups.push(DuplicateGroup::from_run(frames, start, len));
        }
    };

    for (index, verdict) in verdicts.iter().enumerate() {
        let extends = *verdict == Verdict::Duplicate && run_len > 0;
        let over_cap = max_dupes > 0 && run_len >= max_dupes;
        if extends && !over_cap {
            run_len += 1;
            continue;
        }
        if extends && over_cap {
            capped += 1;
        }
        close(run_start, run_len, &mut groups);
        run_start = index;
        run_len = 1;
    }
    close(run_start, run_len, &mut groups);

    if capped > 0 {
        warnings.push(format!(
            "{capped} duplicate verdict(s) exceeded the group cap of {max_dupes} and started new runs"
        ));
    }
    Ok((groups, warnings))
}

/// Scan `frames` with `detector` and summarise the duplicate groups.
pub fn analyze(
    detector: &mut dyn DuplicateDetector,
    frames: &[PathBuf],
    threshold: u32,
    max_dupes: usize,
) -> Result<DuplicateReport> {
    let verdicts = detector
        .scan(frames, threshold, max_dupes)
        .context("duplicate scan failed")?;
    let (groups, warnings) = group_verdicts(frames, &verdicts, max_dupes)?;
    let report = DuplicateReport::new(threshold, max_dupes, frames.len(), groups, warnings);
    info!(
        frames = report.total_frames,
        threshold,
        groups = report.groups.len(),
        dupe_count = report.dupe_count,
        dupe_percent = format!("{:.2}", report.dupe_percent),
        "Duplicate analysis finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Verdict::{Duplicate as D, Keep as K};

    fn names(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("f{i}.png"))).collect()
    }

    #[test]
    fn groups_are_contiguous_runs() {
        let frames = names(8);
        let verdicts = [K, D, D, K, K, D, K, K];
        let (groups, warnings) = group_verdicts(&frames, &verdicts, 0).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].frames().keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(groups[1].keep_index(), 4);
        assert_eq!(groups[1].last_index(), 5);

        let report = DuplicateReport::new(0, 0, frames.len(), groups, warnings);
        assert_eq!(report.dupe_count, 3);
        assert_eq!(report.max_group, 3);
        assert_eq!(report.first_dupe, Some(1));
        assert!((report.dupe_percent - 37.5).abs() < 1e-9);
    }

    #[test]
    fn cap_splits_long_runs() {
        let frames = names(5);
        let (groups, warnings) = group_verdicts(&frames, &[K, D, D, D, D], 2).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].keep_index(), 2);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn cap_of_one_allows_no_groups() {
        let frames = names(4);
        let (groups, warnings) = group_verdicts(&frames, &[K, D, D, K], 1).unwrap();
        assert!(groups.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn empty_input_has_empty_stats() {
        let (groups, warnings) = group_verdicts(&[], &[], 0).unwrap();
        let report = DuplicateReport::new(100, 0, 0, groups, warnings);
        assert_eq!(report.dupe_percent, 0.0);
        assert_eq!(report.max_group, 0);
        assert_eq!(report.first_dupe, None);
        assert!(report.render().contains("first_dupe: none"));
    }

    #[test]
    fn verdict_count_must_match() {
        assert!(group_verdicts(&names(2), &[K], 0).is_err());
    }

    #[test]
    fn render_is_deterministic() {
        let frames = names(4);
        let (groups, warnings) = group_verdicts(&frames, &[K, D, D, K], 0).unwrap();
        let report = DuplicateReport::new(2000, 0, 4, groups, warnings);
        let text = report.render();
        assert_eq!(text, report.render());
        assert!(text.contains("group 1: keep 0:f0.png, duplicates [1:f1.png, 2:f2.png]"));
        assert!(text.contains("dupe_percent: 50.00%"));
    }
}
