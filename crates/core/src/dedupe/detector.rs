use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Edge length of the square blocks compared by [`BlockDiffDetector`].
pub const BLOCK_SIZE: usize = 8;

/// Largest possible per-block sum of absolute luma differences.
pub const MAX_BLOCK_SAD: u32 = (BLOCK_SIZE * BLOCK_SIZE * 255) as u32;

/// Per-frame outcome of a duplicate scan, in source order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Frame starts a new kept run.
    Keep,
    /// Frame duplicates the most recently kept frame.
    Duplicate,
}

pub trait DuplicateDetector {
    /// One verdict per frame. The first frame is always [`Verdict::Keep`].
    ///
    /// `max_dupes` caps a run (keep frame included); `0` means unlimited.
    fn scan(&mut self, frames: &[PathBuf], threshold: u32, max_dupes: usize)
        -> Result<Vec<Verdict>>;
}

/// Luma plane of one frame.
struct LumaFrame {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl LumaFrame {
    fn load(path: &Path) -> Result<Self> {
        let rgb = image::open(path)
            .with_context(|| format!("failed to read {}", path.display()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        let data = rgb
            .as_raw()
            .chunks_exact(3)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect();
        Ok(Self {
            width: width as usize,
            height: height as usize,
            data,
        })
    }

    /// Largest 8x8 block SAD against `other`; `None` when sizes differ.
    fn max_block_sad(&self, other: &LumaFrame) -> Option<u32> {
        if self.width != other.width || self.height != other.height {
            return None;
        }
        let mut worst = 0u32;
        for by in (0..self.height).step_by(BLOCK_SIZE) {
            for bx in (0..self.width).step_by(BLOCK_SIZE) {
                let mut sad = 0u32;
                for y in by..(by + BLOCK_SIZE).min(self.height) {
                    let row = y * self.width;
                    for x in bx..(bx + BLOCK_SIZE).min(self.width) {
                        sad += u32::from(self.data[row + x].abs_diff(other.data[row + x]));
                    }
                }
                worst = worst.max(sad);
            }
        }
        Some(worst)
    }
}

/// BT.601 luma in fixed point.
#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * 77 + u32::from(g) * 150 + u32::from(b) * 29) >> 8) as u8
}

/// Compares each frame against the last kept frame block by block.
///
/// A frame is a duplicate when no 8x8 block differs by more than `threshold`
/// (sum of absolute luma differences, `0..=MAX_BLOCK_SAD`).
#[derive(Debug, Default)]
pub struct BlockDiffDetector;

impl BlockDiffDetector {
    pub fn new() -> Self {
        Self
    }
}

impl DuplicateDetector for BlockDiffDetector {
    fn scan(
        &mut self,
        frames: &[PathBuf],
        threshold: u32,
        max_dupes: usize,
    ) -> Result<Vec<Verdict>> {
        let mut verdicts = Vec::with_capacity(frames.len());
        let mut kept: Option<LumaFrame> = None;
        let mut run = 0usize;

        for (index, path) in frames.iter().enumerate() {
            let frame = LumaFrame::load(path)?;
            let sad = kept.as_ref().and_then(|k| k.max_block_sad(&frame));
            let capped = max_dupes > 0 && run >= max_dupes;
            let duplicate = !capped && sad.is_some_and(|sad| sad <= threshold);

            debug!(
                index,
                frame = %path.display(),
                sad = ?sad,
                duplicate,
                "Duplicate scan"
            );

            if duplicate {
                verdicts.push(Verdict::Duplicate);
                run += 1;
            } else {
                verdicts.push(Verdict::Keep);
                kept = Some(frame);
                run = 1;
            }
        }
        Ok(verdicts)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn gray_frame(dir: &Path, name: &str, value: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(16, 16, Rgb([value, value, value]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn luma_preserves_gray() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(128, 128, 128), 128);
        assert_eq!(luma(255, 255, 255), 255);
    }

    #[test]
    fn identical_frames_are_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            gray_frame(dir.path(), "0.png", 10),
            gray_frame(dir.path(), "1.png", 10),
            gray_frame(dir.path(), "2.png", 200),
        ];
        let verdicts = BlockDiffDetector::new().scan(&frames, 0, 0).unwrap();
        assert_eq!(
            verdicts,
            vec![Verdict::Keep, Verdict::Duplicate, Verdict::Keep]
        );
    }

    #[test]
    fn threshold_is_block_sad() {
        let dir = tempfile::tempdir().unwrap();
        let frames = vec![
            gray_frame(dir.path(), "0.png", 10),
            gray_frame(dir.path(), "1.png", 15),
        ];
        // 64 pixels * 5 levels per block
        let below = BlockDiffDetector::new().scan(&frames, 319, 0).unwrap();
        let at = BlockDiffDetector::new().scan(&frames, 320, 0).unwrap();
        assert_eq!(below[1], Verdict::Keep);
        assert_eq!(at[1], Verdict::Duplicate);
    }

    #[test]
    fn cap_starts_new_run() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<PathBuf> = (0..5)
            .map(|i| gray_frame(dir.path(), &format!("{i}.png"), 42))
            .collect();
        let verdicts = BlockDiffDetector::new().scan(&frames, 0, 2).unwrap();
        assert_eq!(
            verdicts,
            vec![
                Verdict::Keep,
                Verdict::Duplicate,
                Verdict::Keep,
                Verdict::Duplicate,
                Verdict::Keep
            ]
        );
    }

    #[test]
    fn size_mismatch_is_never_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("small.png");
        RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])).save(&small).unwrap();
        let frames = vec![gray_frame(dir.path(), "big.png", 0), small];
        let verdicts = BlockDiffDetector::new()
            .scan(&frames, MAX_BLOCK_SAD, 0)
            .unwrap();
        assert_eq!(verdicts, vec![Verdict::Keep, Verdict::Keep]);
    }
}
