//! Shared data structures for the crash detection pipeline
//!
//! Data flows one way through these types:
//! - `RawSample` (device counts + location, from the helmet)
//! - `ConditionedSample` (physical units, smoothed, with orientation)
//! - `Verdict` / `Assessment` (classifier output + rollover check)
//! - `AlertRecord` (alert lifecycle, handed to persistence and notification)

mod sample;
mod alert;

pub use sample::*;
pub use alert::*;
