//! System-wide default constants.
//!
//! Every tunable in `HelmetConfig` falls back to one of these. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// Sensor
// ============================================================================

/// Accelerometer sensitivity at the ±2 g range (counts per g).
pub const ACC_COUNTS_PER_G: f64 = 16_384.0;

/// Gyroscope sensitivity at the ±250 deg/s range (counts per deg/s).
pub const GYRO_COUNTS_PER_DPS: f64 = 131.0;

/// Exponential smoothing factor applied to acceleration.
pub const SMOOTHING_ALPHA: f64 = 0.1;

/// Resting gravity baseline (g).
pub const GRAVITY_G: f64 = 1.0;

// ============================================================================
// Connectivity
// ============================================================================

/// Feed is considered stale once the newest sample is older than this (ms).
pub const STALE_THRESHOLD_MS: u64 = 5_000;

/// Connectivity watchdog poll interval (ms).
pub const CONNECTIVITY_POLL_INTERVAL_MS: u64 = 1_000;

// ============================================================================
// Classifier
// ============================================================================

/// Motion history retention (ms).
pub const HISTORY_WINDOW_MS: u64 = 1_500;

/// Motion history capacity (samples). 256 covers 1.5 s at 100 Hz with margin.
pub const HISTORY_MAX_SAMPLES: usize = 256;

/// Impact threshold on acceleration magnitude (g).
pub const IMPACT_THRESHOLD_G: f64 = 2.5;

/// Rotation threshold on angular rate magnitude (deg/s).
pub const ROTATION_THRESHOLD_DPS: f64 = 300.0;

/// Consecutive high-rate samples required for sustained rotation.
pub const MIN_ROTATION_SAMPLES: usize = 3;

/// Danger percentage counted as a hit.
pub const CONFIRM_THRESHOLD_PERCENT: f64 = 70.0;

/// Consecutive hits required to raise `is_accident`.
pub const REQUIRED_CONSECUTIVE_HITS: u32 = 2;

/// Ceiling for a rotation contribution that is not sustained.
///
/// Kept below the confirmation threshold so glitches can never confirm.
pub const UNSUSTAINED_ROTATION_CAP: f64 = 60.0;

// ============================================================================
// Alert Lifecycle
// ============================================================================

/// Rider response window before escalation (s).
pub const ESCALATION_SECS: u64 = 30;

/// Lock re-open delay after an alert resolves (s).
pub const COOLDOWN_SECS: u64 = 5;

// ============================================================================
// Simulation
// ============================================================================

/// Synthetic ride sampling rate (Hz).
pub const SYNTHETIC_SAMPLE_RATE_HZ: u64 = 50;

/// Accelerometer noise while riding (g, standard deviation).
pub const SYNTHETIC_ACC_NOISE_G: f64 = 0.05;

/// Gyroscope noise while riding (deg/s, standard deviation).
pub const SYNTHETIC_GYRO_NOISE_DPS: f64 = 4.0;

/// Peak acceleration of an injected crash (g).
pub const SYNTHETIC_CRASH_PEAK_G: f64 = 6.0;

/// Angular rate of the tumble following an injected crash (deg/s).
pub const SYNTHETIC_TUMBLE_DPS: f64 = 450.0;
