//! Helmet Guard: crash detection for IMU-equipped rider helmets
//!
//! ## Architecture
//!
//! - **Connectivity Monitor**: is the helmet feed still live?
//! - **Signal Conditioner**: raw counts to g and deg/s, smoothing, orientation
//! - **Crash Classifier**: impact and sustained-rotation scoring over a short
//!   motion history
//! - **Alert Controller**: one alert at a time, rider confirmation window,
//!   escalation to emergency contacts, cooldown
//!
//! Persistence and notification transport sit behind the [`storage::AlertStore`]
//! and [`notify::Notifier`] traits.

pub mod alerts;
pub mod conditioning;
pub mod config;
pub mod connectivity;
pub mod detection;
pub mod notify;
pub mod pipeline;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::HelmetConfig;

// Re-export commonly used types
pub use types::{
    AlertId, AlertRecord, AlertStatus, Assessment, ConditionedSample, NotificationKind,
    RawSample, SampleError, Vec3, Verdict,
};

// Re-export the four core components
pub use alerts::AlertController;
pub use conditioning::SignalConditioner;
pub use connectivity::ConnectivityMonitor;
pub use detection::CrashClassifier;
