//! Directory listing and naming helpers for image series.
//!
//! The only ordering contract is that a lexical sort of filenames equals
//! temporal order; pixels are never decoded here.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::fraction;

/// Where and how one round names its frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameNaming {
    pub dir: PathBuf,
    pub base_name: String,
    pub extension: String,
}

impl FrameNaming {
    pub fn new(dir: impl Into<PathBuf>, base_name: impl Into<String>, extension: &str) -> Self {
        Self {
            dir: dir.into(),
            base_name: base_name.into(),
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// Same directory and extension, different base name.
    pub fn with_base_name(&self, base_name: impl Into<String>) -> Self {
        Self {
            dir: self.dir.clone(),
            base_name: base_name.into(),
            extension: self.extension.clone(),
        }
    }

    /// `<dir>/<base>@<fraction>.<ext>`
    pub fn fractional_path(&self, value: f64) -> PathBuf {
        self.dir.join(fraction::fractional_name(
            &self.base_name,
            value,
            &self.extension,
        ))
    }

    /// `<dir>/<base><index padded to width>.<ext>`
    pub fn indexed_path(&self, index: usize, width: usize) -> PathBuf {
        self.dir.join(format!(
            "{}{index:0width$}.{}",
            self.base_name, self.extension
        ))
    }
}

/// Number of decimal digits needed to print `n`.
pub fn index_width(n: usize) -> usize {
    let mut width = 1;
    let mut rest = n / 10;
    while rest > 0 {
        width += 1;
        rest /= 10;
    }
    width
}

/// List files in `dir` (optionally filtered by extension), sorted by filename.
pub fn list_frames(dir: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        bail!("input path is not a directory: {}", dir.display());
    }
    let wanted = extension.map(|ext| ext.trim_start_matches('.').to_ascii_lowercase());

    let mut frames = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        if let Some(wanted) = wanted.as_deref() {
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted));
            if !matches {
                continue;
            }
        }
        frames.push(path);
    }
    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}

/// Immediate sub-directories of `dir`, sorted by name.
pub fn list_subdirectories(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("failed to read entry in {}", dir.display()))?
            .path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

pub fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path has no UTF-8 file name: {}", path.display()))
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))
}

pub fn copy_frame(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;
    Ok(())
}

pub fn move_frame(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).with_context(|| {
        format!(
            "failed to rename {} to {}",
            source.display(),
            target.display()
        )
    })
}

pub fn remove_frame(path: &Path) -> Result<()> {
    fs::remove_file(path).with_context(|| format!("failed to delete {}", path.display()))
}
