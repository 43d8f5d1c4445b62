//! Alert lifecycle state machine.
//!
//! ```text
//!            trigger (lock open)         create ok
//!   Idle ─────────────────────▶ Arming ───────────▶ Pending ──cancel──────┐
//!    ▲                            │ create failed      │  ├──confirm──────┤
//!    │◀───────────────────────────┘                    │  └──timer fired──┤
//!    │                                                 ▼                  │
//!    └──────────── cooldown elapsed ─────────────── Cooling ◀─────────────┘
//! ```
//!
//! The trigger lock is open only in `Idle`. Every change goes through
//! [`AlertStateMachine::apply`], which returns the side effects the driver
//! must carry out. Timer and persistence callbacks carry the generation
//! they were issued for; a callback from an older generation is rejected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::AlertConfig;
use crate::types::{
    AlertId, AlertRecord, AlertStatus, Assessment, ConditionedSample, NotificationKind,
};

// ============================================================================
// Phases, Events, Effects
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum AlertPhase {
    /// Trigger lock open
    Idle,
    /// `create_alert` in flight
    Arming { generation: u64, record: AlertRecord },
    /// Waiting for the rider; escalation timer running
    Pending { generation: u64, record: AlertRecord },
    /// Alert resolved; lock re-opens when the cooldown elapses
    Cooling { generation: u64 },
}

impl AlertPhase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            AlertPhase::Idle => PhaseKind::Idle,
            AlertPhase::Arming { .. } => PhaseKind::Arming,
            AlertPhase::Pending { .. } => PhaseKind::Pending,
            AlertPhase::Cooling { .. } => PhaseKind::Cooling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PhaseKind {
    Idle,
    Arming,
    Pending,
    Cooling,
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseKind::Idle => write!(f, "Idle"),
            PhaseKind::Arming => write!(f, "Arming"),
            PhaseKind::Pending => write!(f, "Pending"),
            PhaseKind::Cooling => write!(f, "Cooling"),
        }
    }
}

/// Inputs to the state machine, from the sample pipeline, the rider, the
/// persistence collaborator and the timers.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    Assessed {
        assessment: Assessment,
        sample: ConditionedSample,
    },
    Created {
        generation: u64,
        id: AlertId,
    },
    CreateFailed {
        generation: u64,
    },
    CancelRequested {
        alert_id: Option<AlertId>,
    },
    ConfirmRequested {
        alert_id: Option<AlertId>,
    },
    EscalationElapsed {
        generation: u64,
    },
    CooldownElapsed {
        generation: u64,
    },
}

/// Side effects requested by a transition, in the order they must start.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CreateRecord { generation: u64, record: AlertRecord },
    StartEscalationTimer { generation: u64, after: Duration },
    CancelEscalationTimer { generation: u64 },
    Notify { kind: NotificationKind, record: AlertRecord },
    UpdateRecord { record: AlertRecord },
    ResetClassifier,
    StartCooldown { generation: u64, after: Duration },
}

/// Why an event was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("trigger lock closed ({0})")]
    LockClosed(PhaseKind),
    #[error("no pending alert")]
    NoActiveAlert,
    #[error("alert {requested} is not the pending alert {active}")]
    AlertMismatch { requested: AlertId, active: AlertId },
    #[error("stale callback for generation {0}")]
    Stale(u64),
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertStats {
    pub armed: u64,
    pub create_failures: u64,
    pub cancelled: u64,
    pub confirmed: u64,
    /// Triggers that arrived while the lock was closed
    pub suppressed: u64,
}

// ============================================================================
// State Machine
// ============================================================================

#[derive(Debug, Clone)]
pub struct AlertStateMachine {
    phase: AlertPhase,
    generation: u64,
    escalation: Duration,
    cooldown: Duration,
    last_resolved: Option<AlertRecord>,
    stats: AlertStats,
}

impl AlertStateMachine {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            phase: AlertPhase::Idle,
            generation: 0,
            escalation: Duration::from_secs(config.escalation_secs),
            cooldown: Duration::from_secs(config.cooldown_secs),
            last_resolved: None,
            stats: AlertStats::default(),
        }
    }

    pub fn phase(&self) -> &AlertPhase {
        &self.phase
    }

    pub fn is_lock_open(&self) -> bool {
        matches!(self.phase, AlertPhase::Idle)
    }

    /// The pending record, if an alert is awaiting the rider.
    pub fn active_alert(&self) -> Option<&AlertRecord> {
        match &self.phase {
            AlertPhase::Pending { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn last_resolved(&self) -> Option<&AlertRecord> {
        self.last_resolved.as_ref()
    }

    pub fn stats(&self) -> AlertStats {
        self.stats
    }

    /// The single authoritative transition function.
    pub fn apply(&mut self, event: AlertEvent, now: DateTime<Utc>) -> Result<Vec<Effect>, Rejected> {
        let phase = std::mem::replace(&mut self.phase, AlertPhase::Idle);
        let (next, result) = self.step(phase, event, now);
        self.phase = next;
        result
    }

    fn step(
        &mut self,
        phase: AlertPhase,
        event: AlertEvent,
        now: DateTime<Utc>,
    ) -> (AlertPhase, Result<Vec<Effect>, Rejected>) {
        match (phase, event) {
            // Quiet samples never change anything
            (phase, AlertEvent::Assessed { assessment, .. }) if !assessment.is_trigger() => {
                (phase, Ok(Vec::new()))
            }

            (AlertPhase::Idle, AlertEvent::Assessed { assessment, sample }) => {
                self.generation += 1;
                let generation = self.generation;
                let record = AlertRecord {
                    id: 0,
                    latitude: sample.lat,
                    longitude: sample.lon,
                    danger_percentage: assessment.effective_danger(),
                    raw_accident: sample.acc_unfiltered,
                    raw_gyro: sample.gyro,
                    status: AlertStatus::Pending,
                    user_responded: false,
                    notified: false,
                    rollover: assessment.rollover,
                    created_at: now,
                    resolved_at: None,
                };
                (
                    AlertPhase::Arming { generation, record: record.clone() },
                    Ok(vec![Effect::CreateRecord { generation, record }]),
                )
            }

            (phase, AlertEvent::Assessed { .. }) => {
                self.stats.suppressed += 1;
                let kind = phase.kind();
                (phase, Err(Rejected::LockClosed(kind)))
            }

            (AlertPhase::Arming { generation, mut record }, AlertEvent::Created { generation: g, id })
                if g == generation =>
            {
                record.id = id;
                self.stats.armed += 1;
                (
                    AlertPhase::Pending { generation, record: record.clone() },
                    Ok(vec![
                        Effect::StartEscalationTimer { generation, after: self.escalation },
                        Effect::Notify { kind: NotificationKind::Confirmation, record },
                    ]),
                )
            }

            (AlertPhase::Arming { generation, .. }, AlertEvent::CreateFailed { generation: g })
                if g == generation =>
            {
                self.stats.create_failures += 1;
                (AlertPhase::Idle, Ok(Vec::new()))
            }

            (
                AlertPhase::Pending { generation, record },
                AlertEvent::CancelRequested { alert_id },
            ) => {
                if let Err(rejected) = Self::check_target(alert_id, &record) {
                    return (AlertPhase::Pending { generation, record }, Err(rejected));
                }
                self.stats.cancelled += 1;
                let record = self.resolve(record, AlertStatus::Cancelled, true, false, now);
                (
                    AlertPhase::Cooling { generation },
                    Ok(vec![
                        Effect::CancelEscalationTimer { generation },
                        Effect::UpdateRecord { record },
                        Effect::ResetClassifier,
                        Effect::StartCooldown { generation, after: self.cooldown },
                    ]),
                )
            }

            (
                AlertPhase::Pending { generation, record },
                AlertEvent::ConfirmRequested { alert_id },
            ) => {
                if let Err(rejected) = Self::check_target(alert_id, &record) {
                    return (AlertPhase::Pending { generation, record }, Err(rejected));
                }
                (AlertPhase::Cooling { generation }, Ok(self.escalate(generation, record, true, now)))
            }

            (
                AlertPhase::Pending { generation, record },
                AlertEvent::EscalationElapsed { generation: g },
            ) if g == generation => {
                (AlertPhase::Cooling { generation }, Ok(self.escalate(generation, record, false, now)))
            }

            (AlertPhase::Cooling { generation }, AlertEvent::CooldownElapsed { generation: g })
                if g == generation =>
            {
                (AlertPhase::Idle, Ok(Vec::new()))
            }

            // Rider actions with nothing pending
            (
                phase,
                AlertEvent::CancelRequested { .. } | AlertEvent::ConfirmRequested { .. },
            ) => (phase, Err(Rejected::NoActiveAlert)),

            // Persistence or timer callbacks that lost a race or outlived their alert
            (
                phase,
                AlertEvent::Created { generation, .. }
                | AlertEvent::CreateFailed { generation }
                | AlertEvent::EscalationElapsed { generation }
                | AlertEvent::CooldownElapsed { generation },
            ) => (phase, Err(Rejected::Stale(generation))),
        }
    }

    fn check_target(requested: Option<AlertId>, record: &AlertRecord) -> Result<(), Rejected> {
        match requested {
            Some(id) if id != record.id => Err(Rejected::AlertMismatch {
                requested: id,
                active: record.id,
            }),
            _ => Ok(()),
        }
    }

    fn escalate(
        &mut self,
        generation: u64,
        record: AlertRecord,
        user_responded: bool,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        self.stats.confirmed += 1;
        let record = self.resolve(record, AlertStatus::Confirmed, user_responded, true, now);
        vec![
            Effect::CancelEscalationTimer { generation },
            Effect::UpdateRecord { record: record.clone() },
            Effect::Notify { kind: NotificationKind::Emergency, record },
            Effect::ResetClassifier,
            Effect::StartCooldown { generation, after: self.cooldown },
        ]
    }

    fn resolve(
        &mut self,
        mut record: AlertRecord,
        status: AlertStatus,
        user_responded: bool,
        notified: bool,
        now: DateTime<Utc>,
    ) -> AlertRecord {
        record.status = status;
        record.user_responded = user_responded;
        record.notified = notified;
        record.resolved_at = Some(now);
        self.last_resolved = Some(record.clone());
        record
    }
}

impl Default for AlertStateMachine {
    fn default() -> Self {
        Self::new(&AlertConfig::default())
    }
}
