//! Display state for the helmet pipeline
//!
//! Read by display consumers and the connectivity watchdog, written by the
//! processing loop.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::alerts::AlertSnapshot;
use crate::connectivity::ConnectivityMonitor;
use crate::types::{Assessment, ConditionedSample};

// ============================================================================
// Application State
// ============================================================================

/// Wrapped in `Arc<tokio::sync::RwLock<>>` for access across tasks.
#[derive(Debug, Clone, Serialize)]
pub struct AppState {
    /// System uptime (not serialized)
    #[serde(skip)]
    pub uptime: Instant,

    pub status: SystemStatus,

    /// Feed liveness bookkeeping, keyed by arrival time
    #[serde(skip)]
    pub connectivity: ConnectivityMonitor,

    /// Last liveness verdict published by the watchdog
    pub connected: bool,

    /// Latest conditioned sample (orientation, smoothed acceleration)
    pub latest_sample: Option<ConditionedSample>,

    /// Latest classifier assessment
    pub latest_assessment: Option<Assessment>,

    /// Alert lifecycle as of the latest sample
    pub alerts: Option<AlertSnapshot>,

    pub samples_processed: u64,
    pub samples_dropped: u64,
    pub last_sample_time: Option<DateTime<Utc>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            uptime: Instant::now(),
            status: SystemStatus::Initializing,
            connectivity: ConnectivityMonitor::default(),
            connected: false,
            latest_sample: None,
            latest_assessment: None,
            alerts: None,
            samples_processed: 0,
            samples_dropped: 0,
            last_sample_time: None,
        }
    }
}

impl AppState {
    pub fn new(connectivity: ConnectivityMonitor) -> Self {
        Self {
            connectivity,
            ..Self::default()
        }
    }

    /// Seconds since the pipeline started.
    pub fn uptime_secs(&self) -> u64 {
        self.uptime.elapsed().as_secs()
    }
}

/// Wall clock in Unix milliseconds, as used for arrival times.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Coarse pipeline status for displays and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SystemStatus {
    /// No sample seen yet
    Initializing,
    /// Samples flowing, no alert open
    Monitoring,
    /// An alert is arming, pending or cooling down
    Alert,
    /// Helmet feed went stale
    Disconnected,
    /// Source exhausted or shutdown requested
    Stopped,
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemStatus::Initializing => write!(f, "Initializing"),
            SystemStatus::Monitoring => write!(f, "Monitoring"),
            SystemStatus::Alert => write!(f, "Alert"),
            SystemStatus::Disconnected => write!(f, "Disconnected"),
            SystemStatus::Stopped => write!(f, "Stopped"),
        }
    }
}
