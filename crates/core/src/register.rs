use std::path::{Path, PathBuf};

use crate::fraction;

/// One frame produced (or seeded) during a subdivision round.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredFrame {
    pub fraction: f64,
    pub path: PathBuf,
}

/// Append-only record of the frames written during one round.
///
/// Insertion order is kept only so the most recent entry can be found;
/// consumers that need temporal order call [`FrameRegister::sorted`].
#[derive(Debug, Default, Clone)]
pub struct FrameRegister {
    frames: Vec<RegisteredFrame>,
}

impl FrameRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, fraction: f64, path: impl Into<PathBuf>) {
        self.frames.push(RegisteredFrame {
            fraction,
            path: path.into(),
        });
    }

    /// Path of the frame registered at exactly `fraction`.
    pub fn path_at(&self, fraction: f64) -> Option<&Path> {
        let key = fraction::encode(fraction);
        self.frames
            .iter()
            .rev()
            .find(|frame| fraction::encode(frame.fraction) == key)
            .map(|frame| frame.path.as_path())
    }

    pub fn last(&self) -> Option<&RegisteredFrame> {
        self.frames.last()
    }

    pub fn frames(&self) -> &[RegisteredFrame] {
        &self.frames
    }

    /// Frames ordered by their encoded fraction (lexical order equals temporal order).
    pub fn sorted(&self) -> Vec<RegisteredFrame> {
        let mut keyed: Vec<(String, RegisteredFrame)> = self
            .frames
            .iter()
            .map(|frame| (fraction::encode(frame.fraction), frame.clone()))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.into_iter().map(|(_, frame)| frame).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
