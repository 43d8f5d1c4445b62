//! Crash detection: motion history, classifier and the rollover check.

mod history;
mod classifier;

pub use history::{MotionEntry, MotionHistory};
pub use classifier::CrashClassifier;

use crate::types::ConditionedSample;

/// Helmet is upside-down: the smoothed Z axis, gravity-aligned when
/// upright, has gone negative.
///
/// Independent of the classifier; a stationary inverted helmet is crash
/// evidence on its own.
pub fn is_rollover(sample: &ConditionedSample) -> bool {
    sample.acc.z < 0.0
}
