//! IMU sample types: raw device readings and their conditioned form.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Vector Types
// ============================================================================

/// Three-axis vector used for both accelerometer and gyroscope channels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Divide every axis by the same scale factor.
    pub fn scaled_down(&self, divisor: f64) -> Self {
        Self::new(self.x / divisor, self.y / divisor, self.z / divisor)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Device orientation derived from the gravity vector, in degrees.
///
/// Yaw is not observable from acceleration alone and is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

// ============================================================================
// Raw Sample
// ============================================================================

/// One reading as delivered by the helmet: device-native counts plus a
/// geolocation tag. Timestamp is Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// Accelerometer, LSB counts
    pub acc: Vec3,
    /// Gyroscope, LSB counts
    pub gyro: Vec3,
    pub lat: f64,
    pub lon: f64,
    /// Unix timestamp (milliseconds)
    pub timestamp: u64,
}

impl RawSample {
    /// Reject samples carrying NaN or infinite values.
    ///
    /// Such samples are dropped before conditioning so they never reach the
    /// classifier history or the alert state machine.
    pub fn validate(&self) -> Result<(), SampleError> {
        if !self.acc.is_finite() {
            return Err(SampleError::NonFinite("acc"));
        }
        if !self.gyro.is_finite() {
            return Err(SampleError::NonFinite("gyro"));
        }
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(SampleError::NonFinite("location"));
        }
        Ok(())
    }
}

/// Reasons a sample is dropped from the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("out-of-order sample: timestamp {timestamp} is not after {newest}")]
    OutOfOrder { timestamp: u64, newest: u64 },
}

// ============================================================================
// Conditioned Sample
// ============================================================================

/// A raw sample converted to physical units, smoothed, and annotated with
/// orientation. Transient: never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSample {
    /// Exponentially smoothed acceleration (g)
    pub acc: Vec3,
    /// Unit-converted, unsmoothed acceleration (g). Impact detection reads
    /// this channel so short spikes are not flattened by the smoother.
    pub acc_unfiltered: Vec3,
    /// Angular rate (deg/s), not smoothed
    pub gyro: Vec3,
    pub orientation: Orientation,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawSample {
        RawSample {
            acc: Vec3::new(0.0, 0.0, 16384.0),
            gyro: Vec3::ZERO,
            lat: 59.91,
            lon: 10.75,
            timestamp: 1_000,
        }
    }

    #[test]
    fn test_magnitude() {
        assert!((Vec3::new(3.0, 4.0, 12.0).magnitude() - 13.0).abs() < 1e-12);
        assert_eq!(Vec3::ZERO.magnitude(), 0.0);
    }

    #[test]
    fn test_validate_accepts_finite() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nan_and_inf() {
        let mut s = sample();
        s.gyro.y = f64::NAN;
        assert_eq!(s.validate(), Err(SampleError::NonFinite("gyro")));

        let mut s = sample();
        s.lon = f64::INFINITY;
        assert_eq!(s.validate(), Err(SampleError::NonFinite("location")));
    }

    #[test]
    fn test_raw_sample_json_shape() {
        let json = r#"{"acc":{"x":0,"y":0,"z":16384},"gyro":{"x":1,"y":2,"z":3},"lat":1.5,"lon":2.5,"timestamp":42}"#;
        let s: RawSample = serde_json::from_str(json).expect("valid sample json");
        assert_eq!(s.acc.z, 16384.0);
        assert_eq!(s.gyro, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.timestamp, 42);
    }
}
