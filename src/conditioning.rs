//! Signal Conditioner
//!
//! Converts raw device counts to physical units, smooths acceleration with
//! an exponential moving average and derives pitch/roll from the smoothed
//! gravity vector. Gyroscope rates pass through unsmoothed: the classifier
//! needs their rapid changes intact.

use crate::config::SensorConfig;
use crate::types::{ConditionedSample, Orientation, RawSample, Vec3};

/// Condition one raw sample against the previous smoothed acceleration.
///
/// Returns the conditioned sample and the smoothed acceleration to feed
/// into the next call. Total over all finite inputs.
pub fn condition(
    raw: &RawSample,
    prev_acc: Vec3,
    config: &SensorConfig,
) -> (ConditionedSample, Vec3) {
    let acc = raw.acc.scaled_down(config.acc_counts_per_g);
    let gyro = raw.gyro.scaled_down(config.gyro_counts_per_dps);

    let alpha = config.smoothing_alpha;
    let smoothed = Vec3::new(
        ema(prev_acc.x, acc.x, alpha),
        ema(prev_acc.y, acc.y, alpha),
        ema(prev_acc.z, acc.z, alpha),
    );

    let sample = ConditionedSample {
        acc: smoothed,
        acc_unfiltered: acc,
        gyro,
        orientation: orientation_from_gravity(smoothed),
        lat: raw.lat,
        lon: raw.lon,
        timestamp: raw.timestamp,
    };
    (sample, smoothed)
}

#[inline]
fn ema(prev: f64, value: f64, alpha: f64) -> f64 {
    prev + alpha * (value - prev)
}

/// Pitch and roll (degrees) from an acceleration vector at rest.
pub fn orientation_from_gravity(acc: Vec3) -> Orientation {
    let pitch = acc.y.atan2(acc.z).to_degrees();
    let roll = (-acc.x).atan2(acc.y.hypot(acc.z)).to_degrees();
    Orientation { pitch, roll, yaw: 0.0 }
}

/// Stateful wrapper that carries the smoothed acceleration between samples.
///
/// The first sample seeds the smoother with its own converted value, so a
/// stream never starts with an artificial ramp up from zero.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    config: SensorConfig,
    prev_acc: Option<Vec3>,
}

impl SignalConditioner {
    pub fn new(config: SensorConfig) -> Self {
        Self {
            config,
            prev_acc: None,
        }
    }

    pub fn process(&mut self, raw: &RawSample) -> ConditionedSample {
        let prev = self
            .prev_acc
            .unwrap_or_else(|| raw.acc.scaled_down(self.config.acc_counts_per_g));
        let (sample, next) = condition(raw, prev, &self.config);
        self.prev_acc = Some(next);
        sample
    }

    /// Forget the smoothing state; the next sample re-seeds it.
    pub fn reset(&mut self) {
        self.prev_acc = None;
    }
}

impl Default for SignalConditioner {
    fn default() -> Self {
        Self::new(SensorConfig::default())
    }
}
