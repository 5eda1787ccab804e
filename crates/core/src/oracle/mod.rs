//! Uniform interface over the frame-synthesis backend.
//!
//! The core only ever asks for "the frame at time `t` between these two files".
//! [`FrameOracle::time_step`] is the one required method; midpoint and evenly
//! spaced batches are expressed in terms of it unless a backend overrides them.

pub mod backend;
pub mod rife;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};

use crate::files::{self, FrameNaming};

pub use rife::RifeOracle;

pub trait FrameOracle {
    /// Synthesize the frame at fraction `time` in `(0, 1)` between `before` and `after`.
    fn time_step(&mut self, before: &Path, after: &Path, time: f64, output: &Path)
        -> Result<PathBuf>;

    /// Whether callers may bypass bisection and place frames at arbitrary times.
    fn supports_time_step(&self) -> bool;

    /// Synthesize the frame at fraction 0.5.
    fn midpoint(&mut self, before: &Path, after: &Path, output: &Path) -> Result<PathBuf> {
        self.time_step(before, after, 0.5, output)
    }

    /// Write `steps + 1` frames at fractions `i / steps`, anchors included.
    ///
    /// The anchors at 0.0 and 1.0 are copied verbatim; the `steps - 1` frames in
    /// between are synthesized. Paths come back in ascending time order.
    fn multi(
        &mut self,
        before: &Path,
        after: &Path,
        naming: &FrameNaming,
        steps: u32,
    ) -> Result<Vec<PathBuf>> {
        ensure!(steps >= 1, "multi() needs at least one step, got {steps}");
        files::ensure_dir(&naming.dir)?;

        let mut outputs = Vec::with_capacity(steps as usize + 1);
        let first = naming.fractional_path(0.0);
        files::copy_frame(before, &first)?;
        outputs.push(first);

        for i in 1..steps {
            let time = i as f64 / steps as f64;
            let output = naming.fractional_path(time);
            outputs.push(self.time_step(before, after, time, &output)?);
        }

        let last = naming.fractional_path(1.0);
        files::copy_frame(after, &last)?;
        outputs.push(last);
        Ok(outputs)
    }
}

/// Bundled interpolation models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    #[default]
    Ours,
    OursSmall,
}

impl ModelName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ours => "ours",
            Self::OursSmall => "ours_small",
        }
    }

    /// File name of the ONNX export inside the models directory.
    pub fn file_name(&self) -> String {
        format!("{}.onnx", self.as_str())
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ours" => Ok(Self::Ours),
            "ours_small" | "ours-small" => Ok(Self::OursSmall),
            other => bail!("unknown model '{other}' (expected 'ours' or 'ours_small')"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    /// Writes the requested time into the output file.
    struct StampOracle {
        calls: Vec<f64>,
    }

    impl FrameOracle for StampOracle {
        fn time_step(
            &mut self,
            _before: &Path,
            _after: &Path,
            time: f64,
            output: &Path,
        ) -> Result<PathBuf> {
            self.calls.push(time);
            fs::write(output, time.to_string())?;
            Ok(output.to_path_buf())
        }

        fn supports_time_step(&self) -> bool {
            true
        }
    }

    #[test]
    fn model_name_parses_known_values() {
        assert_eq!("ours".parse::<ModelName>().unwrap(), ModelName::Ours);
        assert_eq!(
            "OURS_SMALL".parse::<ModelName>().unwrap(),
            ModelName::OursSmall
        );
        assert!("rife".parse::<ModelName>().is_err());
        assert_eq!(ModelName::OursSmall.file_name(), "ours_small.onnx");
    }

    #[test]
    fn default_midpoint_uses_half_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut oracle = StampOracle { calls: Vec::new() };
        let out = dir.path().join("mid.png");
        oracle
            .midpoint(Path::new("a"), Path::new("b"), &out)
            .expect("midpoint");
        assert_eq!(oracle.calls, vec![0.5]);
        assert_eq!(fs::read_to_string(out).unwrap(), "0.5");
    }

    #[test]
    fn default_multi_copies_anchors_and_fills_between() {
        let dir = tempfile::tempdir().expect("tempdir");
        let before = dir.path().join("before.png");
        let after = dir.path().join("after.png");
        fs::write(&before, "A").unwrap();
        fs::write(&after, "B").unwrap();

        let naming = FrameNaming::new(dir.path().join("out"), "seg", "png");
        let mut oracle = StampOracle { calls: Vec::new() };
        let paths = oracle.multi(&before, &after, &naming, 4).expect("multi");

        assert_eq!(paths.len(), 5);
        assert_eq!(oracle.calls, vec![0.25, 0.5, 0.75]);
        assert_eq!(fs::read_to_string(&paths[0]).unwrap(), "A");
        assert_eq!(fs::read_to_string(&paths[4]).unwrap(), "B");
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(sorted, paths);
    }
}
