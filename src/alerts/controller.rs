//! Alert Controller
//!
//! Drives [`AlertStateMachine`] from async code. Events are applied under a
//! short synchronous lock; the resulting effects (persistence, timers,
//! notifications) run as spawned tasks after the lock is released, so the
//! sample path never waits on I/O.
//!
//! Timer and persistence tasks report back through the same lock, tagged
//! with the generation they belong to. A cancel racing the escalation timer
//! therefore resolves to exactly one outcome: whichever event is applied
//! first wins and the other is rejected as stale.

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state_machine::{
    AlertEvent, AlertStateMachine, AlertStats, Effect, PhaseKind, Rejected,
};
use crate::config::AlertConfig;
use crate::notify::{ContactBook, Notifier};
use crate::storage::AlertStore;
use crate::types::{AlertId, AlertRecord, Assessment, ConditionedSample};

/// Point-in-time view of the controller, for status displays and tests.
#[derive(Debug, Clone, Serialize)]
pub struct AlertSnapshot {
    pub phase: PhaseKind,
    pub lock_open: bool,
    pub active: Option<AlertRecord>,
    pub last_resolved: Option<AlertRecord>,
    pub stats: AlertStats,
}

struct Core {
    machine: AlertStateMachine,
    /// Escalation timer of the pending alert, by generation
    escalation: Option<(u64, CancellationToken)>,
}

struct Shared {
    core: Mutex<Core>,
    store: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
    contacts: ContactBook,
    reset_epoch: AtomicU64,
    shutdown: CancellationToken,
}

/// Cheap to clone; all clones drive the same alert lifecycle.
#[derive(Clone)]
pub struct AlertController {
    shared: Arc<Shared>,
}

impl AlertController {
    pub fn new(
        config: &AlertConfig,
        store: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
        contacts: ContactBook,
    ) -> Self {
        info!(
            store = store.backend_name(),
            notifier = notifier.notifier_name(),
            escalation_secs = config.escalation_secs,
            cooldown_secs = config.cooldown_secs,
            "Alert controller ready"
        );
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    machine: AlertStateMachine::new(config),
                    escalation: None,
                }),
                store,
                notifier,
                contacts,
                reset_epoch: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Feed one assessment. Returns `true` if it armed a new alert.
    ///
    /// Triggers while an alert is arming, pending or cooling down are
    /// suppressed.
    pub fn on_assessment(&self, assessment: &Assessment, sample: &ConditionedSample) -> bool {
        if !assessment.is_trigger() {
            return false;
        }
        match self.dispatch(AlertEvent::Assessed {
            assessment: *assessment,
            sample: *sample,
        }) {
            Ok(_) => {
                info!(
                    danger = assessment.effective_danger(),
                    rollover = assessment.rollover,
                    "⚠️  Crash suspected, arming alert"
                );
                true
            }
            Err(rejected) => {
                debug!(%rejected, "Trigger suppressed");
                false
            }
        }
    }

    /// Rider says they are fine. `None` targets whichever alert is pending.
    pub fn cancel(&self, alert_id: Option<AlertId>) -> Result<AlertRecord, Rejected> {
        let effects = self.dispatch(AlertEvent::CancelRequested { alert_id })?;
        let record = resolved_record(&effects)?;
        info!(alert_id = record.id, "✅ Alert cancelled by rider");
        Ok(record)
    }

    /// Rider asks for help before the escalation timer runs out.
    pub fn confirm(&self, alert_id: Option<AlertId>) -> Result<AlertRecord, Rejected> {
        let effects = self.dispatch(AlertEvent::ConfirmRequested { alert_id })?;
        let record = resolved_record(&effects)?;
        warn!(alert_id = record.id, "🆘 Alert confirmed by rider");
        Ok(record)
    }

    /// Stop all timers. Pending alerts stay pending in the store.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// Bumped every time the classifier history must be cleared.
    pub fn reset_epoch(&self) -> u64 {
        self.shared.reset_epoch.load(Ordering::Acquire)
    }

    pub fn is_lock_open(&self) -> bool {
        self.lock_core().machine.is_lock_open()
    }

    pub fn active_alert(&self) -> Option<AlertRecord> {
        self.lock_core().machine.active_alert().cloned()
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        let core = self.lock_core();
        AlertSnapshot {
            phase: core.machine.phase().kind(),
            lock_open: core.machine.is_lock_open(),
            active: core.machine.active_alert().cloned(),
            last_resolved: core.machine.last_resolved().cloned(),
            stats: core.machine.stats(),
        }
    }

    /// Most recent stored alert, for front-ends that start mid-ride.
    pub async fn latest_stored_alert(&self) -> Option<AlertRecord> {
        match self.shared.store.list_alerts(1).await {
            Ok(mut records) => records.pop(),
            Err(e) => {
                warn!(error = %e, "Failed to read most recent alert");
                None
            }
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.shared.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, event: AlertEvent) -> Result<Vec<Effect>, Rejected> {
        let (effects, timer) = {
            let mut core = self.lock_core();
            let effects = core.machine.apply(event, Utc::now())?;
            let mut timer = None;
            for effect in &effects {
                match effect {
                    Effect::StartEscalationTimer { generation, .. } => {
                        let token = self.shared.shutdown.child_token();
                        core.escalation = Some((*generation, token.clone()));
                        timer = Some(token);
                    }
                    Effect::CancelEscalationTimer { generation } => {
                        if let Some((owner, token)) = core.escalation.take() {
                            if owner == *generation {
                                token.cancel();
                            } else {
                                core.escalation = Some((owner, token));
                            }
                        }
                    }
                    _ => {}
                }
            }
            (effects, timer)
        };

        for effect in &effects {
            self.execute(effect, timer.as_ref());
        }
        Ok(effects)
    }

    fn execute(&self, effect: &Effect, timer: Option<&CancellationToken>) {
        match effect {
            Effect::CreateRecord { generation, record } => self.spawn_create(*generation, record.clone()),
            Effect::StartEscalationTimer { generation, after } => {
                let Some(token) = timer.cloned() else {
                    return;
                };
                let controller = self.clone();
                let (generation, after) = (*generation, *after);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => debug!(generation, "Escalation timer stopped"),
                        _ = tokio::time::sleep(after) => {
                            match controller.dispatch(AlertEvent::EscalationElapsed { generation }) {
                                Ok(_) => warn!(generation, "⏰ No response from rider, escalating"),
                                Err(rejected) => debug!(%rejected, "Escalation timer lost race"),
                            }
                        }
                    }
                });
            }
            Effect::CancelEscalationTimer { .. } => {}
            Effect::Notify { kind, record } => {
                let recipients = self.shared.contacts.recipients_for(*kind);
                if recipients.is_empty() {
                    warn!(%kind, alert_id = record.id, "No recipients configured");
                }
                let notifier = Arc::clone(&self.shared.notifier);
                let (kind, record) = (*kind, record.clone());
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(kind, &record, &recipients).await {
                        warn!(%kind, alert_id = record.id, error = %e, "Notification failed");
                    }
                });
            }
            Effect::UpdateRecord { record } => {
                let store = Arc::clone(&self.shared.store);
                let record = record.clone();
                tokio::spawn(async move {
                    if let Err(e) = store.update_alert(record.id, record.status, record.flags()).await {
                        error!(alert_id = record.id, status = %record.status, error = %e, "Failed to update alert");
                    }
                });
            }
            Effect::ResetClassifier => {
                self.shared.reset_epoch.fetch_add(1, Ordering::AcqRel);
            }
            Effect::StartCooldown { generation, after } => {
                let controller = self.clone();
                let shutdown = self.shared.shutdown.clone();
                let (generation, after) = (*generation, *after);
                tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        _ = tokio::time::sleep(after) => {
                            if controller.dispatch(AlertEvent::CooldownElapsed { generation }).is_ok() {
                                debug!(generation, "Trigger lock reopened");
                            }
                        }
                    }
                });
            }
        }
    }

    fn spawn_create(&self, generation: u64, record: AlertRecord) {
        let controller = self.clone();
        tokio::spawn(async move {
            let event = match controller.shared.store.create_alert(&record).await {
                Ok(id) => {
                    info!(alert_id = id, danger = record.danger_percentage, "📝 Alert stored, awaiting rider");
                    AlertEvent::Created { generation, id }
                }
                Err(e) => {
                    error!(error = %e, "Failed to store alert, trigger lock reopened");
                    AlertEvent::CreateFailed { generation }
                }
            };
            if let Err(rejected) = controller.dispatch(event) {
                debug!(%rejected, "Create result ignored");
            }
        });
    }
}

fn resolved_record(effects: &[Effect]) -> Result<AlertRecord, Rejected> {
    effects
        .iter()
        .find_map(|effect| match effect {
            Effect::UpdateRecord { record } => Some(record.clone()),
            _ => None,
        })
        .ok_or(Rejected::NoActiveAlert)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{ChannelNotifier, Notice};
    use crate::storage::{InMemoryAlertStore, StoreError};
    use crate::types::{AlertFlags, AlertStatus, NotificationKind, Vec3, Verdict};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        controller: AlertController,
        store: Arc<InMemoryAlertStore>,
        notices: UnboundedReceiver<Notice>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryAlertStore::new());
        let (notifier, notices) = ChannelNotifier::new();
        let contacts = ContactBook::new(&crate::config::ContactsConfig {
            rider: Some("rider@x".into()),
            emergency: vec!["mum@x".into()],
            default_contact: None,
        });
        let controller = AlertController::new(
            &AlertConfig::default(),
            store.clone(),
            Arc::new(notifier),
            contacts,
        );
        Harness { controller, store, notices }
    }

    fn crash() -> (Assessment, ConditionedSample) {
        let assessment = Assessment {
            verdict: Verdict { is_accident: true, danger_percentage: 92.0 },
            ..Default::default()
        };
        let sample = ConditionedSample {
            acc: Vec3::new(0.0, 0.0, 1.2),
            acc_unfiltered: Vec3::new(0.0, 0.0, 6.0),
            gyro: Vec3::ZERO,
            orientation: Default::default(),
            lat: 1.0,
            lon: 2.0,
            timestamp: 10,
        };
        (assessment, sample)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_then_cancel() {
        let mut h = harness();
        let (a, s) = crash();
        assert!(h.controller.on_assessment(&a, &s));
        settle().await;

        let active = h.controller.active_alert().expect("pending");
        assert_eq!(active.status, AlertStatus::Pending);
        let notice = h.notices.recv().await.expect("confirmation");
        assert_eq!(notice.kind, NotificationKind::Confirmation);
        assert_eq!(notice.recipients, vec!["rider@x"]);

        let epoch = h.controller.reset_epoch();
        let record = h.controller.cancel(Some(active.id)).expect("cancelled");
        assert_eq!(record.status, AlertStatus::Cancelled);
        assert_eq!(h.controller.reset_epoch(), epoch + 1);
        settle().await;

        let stored = h.store.get_alert(active.id).await.expect("get").expect("exists");
        assert_eq!(stored.status, AlertStatus::Cancelled);
        assert!(stored.user_responded);

        // Escalation deadline passes without effect
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(h.notices.try_recv().is_err());
        assert_eq!(h.controller.snapshot().stats.confirmed, 0);
        assert!(h.controller.is_lock_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_escalates_once() {
        let mut h = harness();
        let (a, s) = crash();
        h.controller.on_assessment(&a, &s);
        settle().await;
        let id = h.controller.active_alert().expect("pending").id;
        h.notices.recv().await.expect("confirmation");

        tokio::time::sleep(Duration::from_secs(31)).await;
        let notice = h.notices.recv().await.expect("emergency");
        assert_eq!(notice.kind, NotificationKind::Emergency);
        assert_eq!(notice.recipients, vec!["mum@x"]);
        assert!(h.controller.cancel(Some(id)).is_err());

        let stored = h.store.get_alert(id).await.expect("get").expect("exists");
        assert_eq!(stored.status, AlertStatus::Confirmed);
        assert!(stored.notified && !stored.user_responded);
        assert!(h.notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_holds_through_cooldown() {
        let h = harness();
        let (a, s) = crash();
        assert!(h.controller.on_assessment(&a, &s));
        assert!(!h.controller.on_assessment(&a, &s), "arming closes the lock");
        settle().await;
        assert!(!h.controller.on_assessment(&a, &s));
        h.controller.cancel(None).expect("cancel");
        assert!(!h.controller.on_assessment(&a, &s), "cooling keeps the lock closed");

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(h.controller.on_assessment(&a, &s));
        assert_eq!(h.controller.snapshot().stats.suppressed, 3);
    }

    struct FailingStore;

    #[async_trait]
    impl AlertStore for FailingStore {
        async fn create_alert(&self, _record: &AlertRecord) -> Result<AlertId, StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }
        async fn update_alert(&self, _: AlertId, _: AlertStatus, _: AlertFlags) -> Result<(), StoreError> {
            Err(StoreError::Storage("disk full".into()))
        }
        async fn get_alert(&self, _: AlertId) -> Result<Option<AlertRecord>, StoreError> {
            Ok(None)
        }
        async fn list_alerts(&self, _: usize) -> Result<Vec<AlertRecord>, StoreError> {
            Ok(Vec::new())
        }
        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_leaves_lock_open() {
        let (notifier, mut notices) = ChannelNotifier::new();
        let controller = AlertController::new(
            &AlertConfig::default(),
            Arc::new(FailingStore),
            Arc::new(notifier),
            ContactBook::default(),
        );
        let (a, s) = crash();
        assert!(controller.on_assessment(&a, &s));
        settle().await;

        let snap = controller.snapshot();
        assert!(snap.lock_open);
        assert_eq!(snap.stats.create_failures, 1);
        assert!(notices.try_recv().is_err());
        assert!(controller.on_assessment(&a, &s), "next trigger may retry");
    }
}
