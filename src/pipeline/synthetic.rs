//! Synthetic ride generator for demos and soak runs.
//!
//! Produces device-native samples (counts) at a fixed rate: noisy upright
//! riding, then optionally a crash (a short high-g impact followed by a
//! tumble) and the helmet lying on its side.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::config::defaults::{
    SYNTHETIC_ACC_NOISE_G, SYNTHETIC_CRASH_PEAK_G, SYNTHETIC_GYRO_NOISE_DPS,
    SYNTHETIC_SAMPLE_RATE_HZ, SYNTHETIC_TUMBLE_DPS,
};
use crate::config::SensorConfig;
use crate::types::{RawSample, Vec3};

/// Samples at crash peak
const IMPACT_SAMPLES: usize = 3;
/// Samples of tumbling after the impact starts
const TUMBLE_SAMPLES: usize = 8;
/// Northward drift per second while riding (degrees latitude)
const RIDING_DRIFT_DEG_PER_SEC: f64 = 0.000_07;

#[derive(Debug, Clone)]
pub struct SyntheticRide {
    pub duration_secs: f64,
    /// Seconds into the ride at which the crash starts
    pub crash_at_secs: Option<f64>,
    pub start_ms: u64,
    pub start_lat: f64,
    pub start_lon: f64,
    pub seed: u64,
}

impl Default for SyntheticRide {
    fn default() -> Self {
        Self {
            duration_secs: 60.0,
            crash_at_secs: None,
            start_ms: 1_700_000_000_000,
            start_lat: 59.9139,
            start_lon: 10.7522,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Segment {
    Riding,
    Impact,
    Tumble,
    Lying,
}

impl SyntheticRide {
    pub fn generate(&self, sensor: &SensorConfig) -> Result<Vec<RawSample>> {
        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            return Err(anyhow!("Invalid ride duration: {}", self.duration_secs));
        }
        let acc_noise = Normal::new(0.0, SYNTHETIC_ACC_NOISE_G)
            .map_err(|e| anyhow!("Invalid accelerometer noise: {}", e))?;
        let gyro_noise = Normal::new(0.0, SYNTHETIC_GYRO_NOISE_DPS)
            .map_err(|e| anyhow!("Invalid gyroscope noise: {}", e))?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let period_ms = 1_000 / SYNTHETIC_SAMPLE_RATE_HZ;
        let count = (self.duration_secs * SYNTHETIC_SAMPLE_RATE_HZ as f64).round() as usize;
        let crash_index = self
            .crash_at_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(|s| (s * SYNTHETIC_SAMPLE_RATE_HZ as f64).round() as usize);

        let mut lat = self.start_lat;
        let mut samples = Vec::with_capacity(count);

        for i in 0..count {
            let segment = match crash_index {
                Some(c) if i >= c && i < c + IMPACT_SAMPLES => Segment::Impact,
                Some(c) if i >= c && i < c + TUMBLE_SAMPLES => Segment::Tumble,
                Some(c) if i >= c => Segment::Lying,
                _ => Segment::Riding,
            };

            let (acc, gyro) = match segment {
                Segment::Riding => (Vec3::new(0.0, 0.0, 1.0), Vec3::ZERO),
                Segment::Impact => (
                    Vec3::new(SYNTHETIC_CRASH_PEAK_G * 0.6, 0.0, SYNTHETIC_CRASH_PEAK_G * 0.8),
                    Vec3::new(0.0, SYNTHETIC_TUMBLE_DPS, 0.0),
                ),
                Segment::Tumble => (
                    Vec3::new(0.7, 0.3, 0.6),
                    Vec3::new(SYNTHETIC_TUMBLE_DPS * 0.3, SYNTHETIC_TUMBLE_DPS, 0.0),
                ),
                Segment::Lying => (Vec3::new(0.95, 0.0, 0.3), Vec3::ZERO),
            };

            let mut jitter = |v: Vec3, dist: &Normal<f64>| {
                Vec3::new(
                    v.x + dist.sample(&mut rng),
                    v.y + dist.sample(&mut rng),
                    v.z + dist.sample(&mut rng),
                )
            };
            let acc = jitter(acc, &acc_noise);
            let gyro = jitter(gyro, &gyro_noise);

            if segment == Segment::Riding {
                lat += RIDING_DRIFT_DEG_PER_SEC / SYNTHETIC_SAMPLE_RATE_HZ as f64;
            }

            samples.push(RawSample {
                acc: Vec3::new(
                    acc.x * sensor.acc_counts_per_g,
                    acc.y * sensor.acc_counts_per_g,
                    acc.z * sensor.acc_counts_per_g,
                ),
                gyro: Vec3::new(
                    gyro.x * sensor.gyro_counts_per_dps,
                    gyro.y * sensor.gyro_counts_per_dps,
                    gyro.z * sensor.gyro_counts_per_dps,
                ),
                lat,
                lon: self.start_lon,
                timestamp: self.start_ms + i as u64 * period_ms,
            });
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::CrashClassifier;
    use crate::pipeline::source::SampleSource;
    use crate::conditioning::SignalConditioner;

    fn run(ride: &SyntheticRide) -> Vec<bool> {
        let mut conditioner = SignalConditioner::default();
        let mut classifier = CrashClassifier::default();
        ride.generate(&SensorConfig::default())
            .expect("generate")
            .iter()
            .map(|raw| {
                let sample = conditioner.process(raw);
                classifier.add_sample(&sample).expect("ordered");
                classifier.detect_with_history().is_accident
            })
            .collect()
    }

    #[test]
    fn test_quiet_ride_never_triggers() {
        let ride = SyntheticRide { duration_secs: 20.0, ..Default::default() };
        assert!(run(&ride).iter().all(|hit| !hit));
    }

    #[test]
    fn test_crash_triggers_near_injection_point() {
        let ride = SyntheticRide { duration_secs: 10.0, crash_at_secs: Some(4.0), ..Default::default() };
        let hits = run(&ride);
        let first = hits.iter().position(|h| *h).expect("crash detected");
        assert!((200..210).contains(&first), "first hit at sample {first}");
    }

    #[test]
    fn test_deterministic_for_seed() {
        let ride = SyntheticRide { duration_secs: 1.0, ..Default::default() };
        let a = ride.generate(&SensorConfig::default()).expect("generate");
        let b = ride.generate(&SensorConfig::default()).expect("generate");
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert_eq!(a[1].timestamp - a[0].timestamp, 20);
    }

    #[tokio::test]
    async fn test_feeds_replay_source() {
        let samples = SyntheticRide { duration_secs: 0.1, ..Default::default() }
            .generate(&SensorConfig::default())
            .expect("generate");
        let mut src = crate::pipeline::source::ReplaySource::new(samples).named("synthetic");
        assert_eq!(src.source_name(), "synthetic");
        assert!(src.next_sample().await.is_ok());
    }
}
