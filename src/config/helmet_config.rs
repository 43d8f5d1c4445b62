//! Helmet Configuration - every detection constant as an operator-tunable TOML value
//!
//! Each struct implements `Default` with the values the detector was tuned
//! with, so a deployment without a config file behaves identically to one
//! with an empty file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "HELMET_GUARD_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "helmet_guard.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one helmet / rider deployment.
///
/// Load with `HelmetConfig::load()` which searches:
/// 1. `$HELMET_GUARD_CONFIG` env var
/// 2. `./helmet_guard.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelmetConfig {
    /// Rider / device identification
    #[serde(default)]
    pub rider: RiderInfo,

    /// Raw unit conversion and smoothing
    #[serde(default)]
    pub sensor: SensorConfig,

    /// Feed freshness
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// Crash classifier tuning
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Alert escalation timing
    #[serde(default)]
    pub alert: AlertConfig,

    /// Notification recipients
    #[serde(default)]
    pub contacts: ContactsConfig,

    /// Alert persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

impl HelmetConfig {
    /// Load configuration using the standard search order:
    /// 1. `$HELMET_GUARD_CONFIG` environment variable
    /// 2. `./helmet_guard.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), rider = %config.rider.name, "Loaded helmet config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(rider = %config.rider.name, "Loaded helmet config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        // Typos never fail a load, they only warn
        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration as pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))
    }

    /// Check every value for internal consistency.
    ///
    /// All violations are collected so the operator sees them in one pass.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let s = &self.sensor;
        Self::check_positive(s.acc_counts_per_g, "sensor.acc_counts_per_g", &mut errors);
        Self::check_positive(s.gyro_counts_per_dps, "sensor.gyro_counts_per_dps", &mut errors);
        if !(s.smoothing_alpha > 0.0 && s.smoothing_alpha <= 1.0) {
            errors.push(format!(
                "sensor.smoothing_alpha ({}) must be in (0, 1]",
                s.smoothing_alpha
            ));
        }

        if self.connectivity.stale_threshold_ms == 0 {
            errors.push("connectivity.stale_threshold_ms must be > 0".to_string());
        }
        if self.connectivity.poll_interval_ms == 0 {
            errors.push("connectivity.poll_interval_ms must be > 0".to_string());
        }

        let c = &self.classifier;
        if c.window_ms == 0 {
            errors.push("classifier.window_ms must be > 0".to_string());
        }
        if c.max_samples == 0 {
            errors.push("classifier.max_samples must be > 0".to_string());
        }
        if c.impact_threshold_g.is_finite() && c.impact_threshold_g <= defaults::GRAVITY_G {
            errors.push(format!(
                "classifier.impact_threshold_g ({:.2}) must be above the 1 g resting baseline",
                c.impact_threshold_g
            ));
        }
        Self::check_positive(c.impact_threshold_g, "classifier.impact_threshold_g", &mut errors);
        Self::check_positive(
            c.rotation_threshold_dps,
            "classifier.rotation_threshold_dps",
            &mut errors,
        );
        if c.min_rotation_samples == 0 {
            errors.push("classifier.min_rotation_samples must be > 0".to_string());
        }
        if !(c.confirm_threshold_percent > 0.0 && c.confirm_threshold_percent <= 100.0) {
            errors.push(format!(
                "classifier.confirm_threshold_percent ({}) must be in (0, 100]",
                c.confirm_threshold_percent
            ));
        }
        if c.required_consecutive_hits == 0 {
            errors.push("classifier.required_consecutive_hits must be > 0".to_string());
        }

        if self.alert.escalation_secs == 0 {
            errors.push("alert.escalation_secs must be > 0".to_string());
        }

        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons silently pass, catch them explicitly
        if !value.is_finite() {
            errors.push(format!("{name}: value must be finite (got {value})"));
        } else if value <= 0.0 {
            errors.push(format!("{name} ({value}) must be > 0"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Rider Info
// ============================================================================

/// Identification metadata: appears in logs and notices, not used for logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderInfo {
    #[serde(default = "default_rider_name")]
    pub name: String,

    /// Helmet / device identifier
    #[serde(default)]
    pub device_id: String,
}

fn default_rider_name() -> String {
    "RIDER".to_string()
}

impl Default for RiderInfo {
    fn default() -> Self {
        Self {
            name: default_rider_name(),
            device_id: String::new(),
        }
    }
}

// ============================================================================
// Sensor
// ============================================================================

/// Raw-count conversion factors and acceleration smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Accelerometer sensitivity (counts per g)
    #[serde(default = "default_acc_counts")]
    pub acc_counts_per_g: f64,

    /// Gyroscope sensitivity (counts per deg/s)
    #[serde(default = "default_gyro_counts")]
    pub gyro_counts_per_dps: f64,

    /// Exponential smoothing factor for acceleration
    #[serde(default = "default_smoothing_alpha")]
    pub smoothing_alpha: f64,
}

fn default_acc_counts() -> f64 { defaults::ACC_COUNTS_PER_G }
fn default_gyro_counts() -> f64 { defaults::GYRO_COUNTS_PER_DPS }
fn default_smoothing_alpha() -> f64 { defaults::SMOOTHING_ALPHA }

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            acc_counts_per_g: default_acc_counts(),
            gyro_counts_per_dps: default_gyro_counts(),
            smoothing_alpha: default_smoothing_alpha(),
        }
    }
}

// ============================================================================
// Connectivity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Feed is stale once the newest sample is older than this (ms)
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_ms: u64,

    /// How often the watchdog re-checks freshness (ms)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_stale_threshold() -> u64 { defaults::STALE_THRESHOLD_MS }
fn default_poll_interval() -> u64 { defaults::CONNECTIVITY_POLL_INTERVAL_MS }

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            stale_threshold_ms: default_stale_threshold(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Crash classifier thresholds and motion history sizing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Motion history retention (ms)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Hard cap on history entries regardless of timestamps
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Instantaneous acceleration magnitude that counts as an impact (g)
    #[serde(default = "default_impact_threshold")]
    pub impact_threshold_g: f64,

    /// Angular rate magnitude that counts as violent rotation (deg/s)
    #[serde(default = "default_rotation_threshold")]
    pub rotation_threshold_dps: f64,

    /// Consecutive high-rate samples before rotation counts as sustained
    #[serde(default = "default_min_rotation_samples")]
    pub min_rotation_samples: usize,

    /// Danger percentage at which an evaluation counts as a hit
    #[serde(default = "default_confirm_threshold")]
    pub confirm_threshold_percent: f64,

    /// Consecutive hits required before `is_accident` is raised
    #[serde(default = "default_required_hits")]
    pub required_consecutive_hits: u32,
}

fn default_window_ms() -> u64 { defaults::HISTORY_WINDOW_MS }
fn default_max_samples() -> usize { defaults::HISTORY_MAX_SAMPLES }
fn default_impact_threshold() -> f64 { defaults::IMPACT_THRESHOLD_G }
fn default_rotation_threshold() -> f64 { defaults::ROTATION_THRESHOLD_DPS }
fn default_min_rotation_samples() -> usize { defaults::MIN_ROTATION_SAMPLES }
fn default_confirm_threshold() -> f64 { defaults::CONFIRM_THRESHOLD_PERCENT }
fn default_required_hits() -> u32 { defaults::REQUIRED_CONSECUTIVE_HITS }

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_samples: default_max_samples(),
            impact_threshold_g: default_impact_threshold(),
            rotation_threshold_dps: default_rotation_threshold(),
            min_rotation_samples: default_min_rotation_samples(),
            confirm_threshold_percent: default_confirm_threshold(),
            required_consecutive_hits: default_required_hits(),
        }
    }
}

// ============================================================================
// Alert Timing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Time the rider has to cancel before emergency contacts are notified (s)
    #[serde(default = "default_escalation_secs")]
    pub escalation_secs: u64,

    /// Lock stays closed this long after an alert resolves (s)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_escalation_secs() -> u64 { defaults::ESCALATION_SECS }
fn default_cooldown_secs() -> u64 { defaults::COOLDOWN_SECS }

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            escalation_secs: default_escalation_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

// ============================================================================
// Contacts
// ============================================================================

/// Who receives notices. Addresses are opaque to the core (email, chat id).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactsConfig {
    /// Receives confirmation notices
    #[serde(default)]
    pub rider: Option<String>,

    /// Receive emergency notices
    #[serde(default)]
    pub emergency: Vec<String>,

    /// Used whenever the specific recipient list is empty
    #[serde(default)]
    pub default_contact: Option<String>,
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled database directory; empty keeps alerts in memory only
    #[serde(default)]
    pub path: String,
}
