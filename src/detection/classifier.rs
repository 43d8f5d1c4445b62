//! Crash Classifier
//!
//! Two independent signals, evaluated over the motion history after every
//! reading:
//!
//! ## Impact
//! - Acceleration magnitude of the newest reading
//! - Only the excess over the impact threshold scores: a reading at or
//!   below it contributes 0 %, anything above it ramps from the
//!   confirmation threshold to 100 % at twice the impact threshold
//!
//! ## Rotation
//! - Trailing run of readings above the rotation threshold
//! - Only a run of at least `min_rotation_samples` scores past the
//!   confirmation threshold; a single-sample spike is capped below it
//!
//! The danger percentage is the maximum of the two (never the sum), and
//! `is_accident` requires `required_consecutive_hits` evaluations in a row
//! at or above the confirmation threshold.

use tracing::debug;

use super::history::{MotionEntry, MotionHistory};
use crate::config::defaults::UNSUSTAINED_ROTATION_CAP;
use crate::config::ClassifierConfig;
use crate::types::{ConditionedSample, SampleError, Vec3, Verdict, VerdictDetail};

#[derive(Debug, Clone)]
pub struct CrashClassifier {
    config: ClassifierConfig,
    history: MotionHistory,
    consecutive_hits: u32,
}

impl CrashClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            history: MotionHistory::new(config.window_ms, config.max_samples),
            config,
            consecutive_hits: 0,
        }
    }

    /// Append one unit-converted reading.
    pub fn add_reading(&mut self, timestamp: u64, acc: Vec3, gyro: Vec3) -> Result<(), SampleError> {
        self.history.push(MotionEntry::new(timestamp, acc, gyro))
    }

    /// Append a conditioned sample, using its unfiltered acceleration.
    pub fn add_sample(&mut self, sample: &ConditionedSample) -> Result<(), SampleError> {
        self.add_reading(sample.timestamp, sample.acc_unfiltered, sample.gyro)
    }

    /// Evaluate the current history.
    pub fn detect_with_history(&mut self) -> Verdict {
        self.evaluate().0
    }

    /// Evaluate the current history, returning the diagnostic breakdown too.
    ///
    /// Each call counts as one evaluation for the consecutive-hit rule.
    pub fn evaluate(&mut self) -> (Verdict, VerdictDetail) {
        let Some(newest) = self.history.newest().copied() else {
            self.consecutive_hits = 0;
            return (Verdict::default(), VerdictDetail::default());
        };

        let impact_score = self.impact_score(newest.acc_magnitude);
        let (rotation_run, run_peak) = self
            .history
            .trailing_gyro_run(self.config.rotation_threshold_dps);
        let rotation_score = self.rotation_score(rotation_run, run_peak, newest.gyro_magnitude);

        let danger = impact_score.max(rotation_score).clamp(0.0, 100.0);

        if danger >= self.config.confirm_threshold_percent {
            self.consecutive_hits = self.consecutive_hits.saturating_add(1);
        } else {
            self.consecutive_hits = 0;
        }
        let is_accident = self.consecutive_hits >= self.config.required_consecutive_hits;

        let detail = VerdictDetail {
            impact_score,
            rotation_score,
            newest_acc_g: newest.acc_magnitude,
            peak_acc_g: self.history.peak_acc(),
            peak_gyro_dps: self.history.peak_gyro(),
            rotation_run,
            consecutive_hits: self.consecutive_hits,
        };

        if self.consecutive_hits > 0 {
            debug!(
                danger,
                hits = self.consecutive_hits,
                impact = impact_score,
                rotation = rotation_score,
                "Classifier hit"
            );
        }

        (
            Verdict {
                is_accident,
                danger_percentage: danger,
            },
            detail,
        )
    }

    /// Clear the history and the consecutive-hit accumulator.
    pub fn reset(&mut self) {
        self.history.clear();
        self.consecutive_hits = 0;
    }

    pub fn history(&self) -> &MotionHistory {
        &self.history
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    fn impact_score(&self, magnitude: f64) -> f64 {
        let threshold = self.config.impact_threshold_g;
        let confirm = self.config.confirm_threshold_percent;
        if magnitude.is_nan() || magnitude <= threshold {
            return 0.0;
        }
        (confirm + (100.0 - confirm) * (magnitude - threshold) / threshold).clamp(0.0, 100.0)
    }

    fn rotation_score(&self, run: usize, run_peak: f64, newest_rate: f64) -> f64 {
        let threshold = self.config.rotation_threshold_dps;
        let confirm = self.config.confirm_threshold_percent;

        if run >= self.config.min_rotation_samples {
            (confirm + (100.0 - confirm) * (run_peak - threshold) / threshold).clamp(0.0, 100.0)
        } else {
            let cap = UNSUSTAINED_ROTATION_CAP.min(confirm * 0.9);
            cap * (newest_rate / threshold).min(1.0)
        }
    }
}

impl Default for CrashClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
