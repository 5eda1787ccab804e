//! Frame interpolation engines over directories of image files.
//!
//! Everything works on fractional positions between two anchor frames. The
//! [`oracle`] produces new frames; the engines decide which ones to ask for.

pub mod batch;
pub mod config;
pub mod dedupe;
pub mod deep;
pub mod files;
pub mod fraction;
pub mod logging;
pub mod oracle;
pub mod precision;
pub mod progress;
pub mod register;
pub mod resample;
pub mod restore;
pub mod search;
pub mod series;
pub mod split;
pub mod warnings;
