//! Near-duplicate detection over a frame series and what to do about it.
//!
//! A [`DuplicateDetector`] emits one [`Verdict`] per frame; [`analyze`] folds
//! the verdicts into [`DuplicateGroup`]s; the dispositions report, delete,
//! refill or sweep thresholds over that report.

pub mod analyzer;
pub mod detector;
pub mod dispositions;

pub use analyzer::{analyze, group_verdicts, DuplicateGroup, DuplicateReport};
pub use detector::{BlockDiffDetector, DuplicateDetector, Verdict, MAX_BLOCK_SAD};
pub use dispositions::{
    autofill, delete_duplicates, render_report, tune, AutofillOptions, AutofillOutcome,
    DeleteOutcome, TuneRange, TuneRow, TuneTable,
};
