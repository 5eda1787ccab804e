#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use frameweave_core::dedupe::{DuplicateDetector, Verdict};
use frameweave_core::oracle::FrameOracle;
use image::{Rgb, RgbImage};

/// Frames are text files holding their logical time; synthesized frames get
/// the linear blend of their inputs.
pub struct TimeOracle {
    pub time_step: bool,
    pub calls: Vec<f64>,
}

impl TimeOracle {
    pub fn bisecting() -> Self {
        Self {
            time_step: false,
            calls: Vec::new(),
        }
    }

    pub fn direct() -> Self {
        Self {
            time_step: true,
            calls: Vec::new(),
        }
    }
}

pub fn read_time(path: &Path) -> Result<f64> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("missing input {}", path.display()))?;
    Ok(raw.trim().parse()?)
}

impl FrameOracle for TimeOracle {
    fn time_step(&mut self, before: &Path, after: &Path, time: f64, output: &Path) -> Result<PathBuf> {
        if !(time > 0.0 && time < 1.0) {
            bail!("time {time} outside (0, 1)");
        }
        let a = read_time(before)?;
        let b = read_time(after)?;
        let t = a + (b - a) * time;
        self.calls.push(t);
        fs::write(output, t.to_string())?;
        Ok(output.to_path_buf())
    }

    fn supports_time_step(&self) -> bool {
        self.time_step
    }
}

/// Duplicate when the text content equals the last kept frame's.
pub struct TextDetector;

impl DuplicateDetector for TextDetector {
    fn scan(&mut self, frames: &[PathBuf], _threshold: u32, max_dupes: usize) -> Result<Vec<Verdict>> {
        let mut verdicts = Vec::with_capacity(frames.len());
        let mut kept: Option<String> = None;
        let mut run = 0usize;
        for path in frames {
            let content = fs::read_to_string(path)?;
            let capped = max_dupes > 0 && run >= max_dupes;
            if !capped && kept.as_deref() == Some(content.as_str()) {
                verdicts.push(Verdict::Duplicate);
                run += 1;
            } else {
                verdicts.push(Verdict::Keep);
                kept = Some(content);
                run = 1;
            }
        }
        Ok(verdicts)
    }
}

/// Write `times` as `f0.png, f1.png, ...` into `dir`.
pub fn time_frames(dir: &Path, times: &[&str]) -> Vec<PathBuf> {
    fs::create_dir_all(dir).expect("create frame dir");
    times
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let path = dir.join(format!("f{i}.png"));
            fs::write(&path, t).expect("write frame");
            path
        })
        .collect()
}

/// Solid gray 16x16 PNGs, one per value.
pub fn gray_frames(dir: &Path, values: &[u8]) -> Vec<PathBuf> {
    fs::create_dir_all(dir).expect("create frame dir");
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let path = dir.join(format!("g{i:02}.png"));
            RgbImage::from_pixel(16, 16, Rgb([*v, *v, *v]))
                .save(&path)
                .expect("write png");
            path
        })
        .collect()
}

pub fn names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .expect("file name")
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

pub fn dir_names(dir: &Path) -> Vec<String> {
    let mut entries: Vec<String> = fs::read_dir(dir)
        .expect("read dir")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    entries
}
