//! Nested progress bars keyed by recursion depth.
//!
//! Work runs on a single thread, so plain stack discipline is enough: the
//! innermost bar is always the one that advances and the first one to close.
//! The whole stack renders on one stderr line.

use std::time::Instant;

const PROGRESS_BAR_WIDTH: usize = 30;

#[derive(Debug)]
struct ProgressBar {
    label: String,
    total: u64,
    done: u64,
}

#[derive(Debug)]
pub struct ProgressStack {
    enabled: bool,
    bars: Vec<ProgressBar>,
    started: Instant,
}

impl ProgressStack {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            bars: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// Open a bar one level below the current innermost bar.
    pub fn push(&mut self, label: impl Into<String>, total: u64) {
        if self.bars.is_empty() {
            self.started = Instant::now();
        }
        self.bars.push(ProgressBar {
            label: label.into(),
            total,
            done: 0,
        });
        self.render();
    }

    /// Advance the innermost bar by one step.
    pub fn tick(&mut self) {
        if let Some(bar) = self.bars.last_mut() {
            bar.done += 1;
        }
        self.render();
    }

    /// Close the innermost bar and advance its parent.
    pub fn pop(&mut self) {
        if self.bars.pop().is_none() {
            return;
        }
        if self.bars.is_empty() {
            if self.enabled {
                eprintln!();
            }
        } else {
            self.tick();
        }
    }

    fn render(&self) {
        if !self.enabled || self.bars.is_empty() {
            return;
        }
        eprint!(
            "\r{} | Elapsed: {}    ",
            self.status_line(),
            format_duration(self.started.elapsed().as_secs_f64())
        );
    }

    fn status_line(&self) -> String {
        let mut parts: Vec<String> = self
            .bars
            .iter()
            .map(|bar| format!("{} {}/{}", bar.label, bar.done, bar.total))
            .collect();
        if let Some(inner) = self.bars.last() {
            let fraction = if inner.total > 0 {
                (inner.done as f64 / inner.total as f64).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let filled = (fraction * PROGRESS_BAR_WIDTH as f64).round() as usize;
            let empty = PROGRESS_BAR_WIDTH.saturating_sub(filled);
            let bar: String = "█".repeat(filled) + &"░".repeat(empty);
            parts.push(format!("[{bar}] {:5.1}%", fraction * 100.0));
        }
        parts.join(" > ")
    }
}

impl Default for ProgressStack {
    fn default() -> Self {
        Self::disabled()
    }
}

pub fn format_duration(secs: f64) -> String {
    let total = secs.round() as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}
