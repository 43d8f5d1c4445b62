//! Classifier verdicts and alert records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Vec3;

// ============================================================================
// Classifier Output
// ============================================================================

/// Per-evaluation crash verdict. Carries no history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub is_accident: bool,
    /// 0..=100
    pub danger_percentage: f64,
}

/// Diagnostic breakdown of a single classifier evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VerdictDetail {
    /// Impact signal contribution (0..=100)
    pub impact_score: f64,
    /// Rotation signal contribution (0..=100)
    pub rotation_score: f64,
    /// Acceleration magnitude of the newest sample (g)
    pub newest_acc_g: f64,
    /// Peak acceleration magnitude within the window (g)
    pub peak_acc_g: f64,
    /// Peak angular rate magnitude within the window (deg/s)
    pub peak_gyro_dps: f64,
    /// Trailing run of samples above the rotation threshold
    pub rotation_run: usize,
    /// Consecutive evaluations at or above the confirmation threshold
    pub consecutive_hits: u32,
}

/// Classifier verdict combined with the independent rollover check.
///
/// This is what the alert controller consumes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Assessment {
    pub verdict: Verdict,
    pub detail: VerdictDetail,
    /// Helmet is upside-down (smoothed Z acceleration negative)
    pub rollover: bool,
}

impl Assessment {
    /// Whether this assessment should arm an alert.
    pub fn is_trigger(&self) -> bool {
        self.verdict.is_accident || self.rollover
    }

    /// Danger reported on the alert: rollover forces the maximum.
    pub fn effective_danger(&self) -> f64 {
        if self.rollover {
            100.0
        } else {
            self.verdict.danger_percentage
        }
    }
}

// ============================================================================
// Alert Records
// ============================================================================

/// Identifier assigned by the persistence collaborator.
pub type AlertId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Pending => write!(f, "Pending"),
            AlertStatus::Confirmed => write!(f, "Confirmed"),
            AlertStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Flags written alongside a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlertFlags {
    pub user_responded: bool,
    pub notified: bool,
}

/// A crash alert. Created Pending when the controller arms, then moved to
/// Confirmed or Cancelled exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Assigned on successful creation; 0 until then
    pub id: AlertId,
    pub latitude: f64,
    pub longitude: f64,
    pub danger_percentage: f64,
    /// Acceleration that triggered the alert (g, unfiltered)
    pub raw_accident: Vec3,
    /// Angular rate that triggered the alert (deg/s)
    pub raw_gyro: Vec3,
    pub status: AlertStatus,
    pub user_responded: bool,
    pub notified: bool,
    pub rollover: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn flags(&self) -> AlertFlags {
        AlertFlags {
            user_responded: self.user_responded,
            notified: self.notified,
        }
    }
}

/// Notice sent to the notification collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Addressed to the rider: "are you okay?"
    Confirmation,
    /// Addressed to emergency contacts after escalation
    Emergency,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationKind::Confirmation => write!(f, "confirmation"),
            NotificationKind::Emergency => write!(f, "emergency"),
        }
    }
}
