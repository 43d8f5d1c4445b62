//! Alert controller lifecycle under virtual time.
//!
//! Every test runs with a paused tokio clock, so 30 s escalation windows
//! elapse instantly and rider responses around the deadline are
//! reproducible.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, sleep_until, Duration, Instant};

use helmet_guard::alerts::{AlertController, PhaseKind, Rejected};
use helmet_guard::config::{AlertConfig, ContactsConfig};
use helmet_guard::notify::{ChannelNotifier, ContactBook, Notice, Notifier, NotifyError};
use helmet_guard::storage::{AlertStore, InMemoryAlertStore, StoreError};
use helmet_guard::types::{
    AlertFlags, AlertId, AlertRecord, AlertStatus, Assessment, ConditionedSample,
    NotificationKind, Vec3, Verdict,
};

// ============================================================================
// Fixtures
// ============================================================================

fn contacts() -> ContactBook {
    ContactBook::new(&ContactsConfig {
        rider: Some("rider@example.com".into()),
        emergency: vec!["mum@example.com".into(), "dad@example.com".into()],
        default_contact: None,
    })
}

fn crash(danger: f64) -> (Assessment, ConditionedSample) {
    let assessment = Assessment {
        verdict: Verdict { is_accident: true, danger_percentage: danger },
        ..Default::default()
    };
    let sample = ConditionedSample {
        acc: Vec3::new(0.0, 0.0, 1.4),
        acc_unfiltered: Vec3::new(0.0, 0.0, 6.0),
        gyro: Vec3::new(0.0, 120.0, 0.0),
        orientation: Default::default(),
        lat: 59.91,
        lon: 10.75,
        timestamp: 1_000,
    };
    (assessment, sample)
}

fn setup() -> (AlertController, Arc<InMemoryAlertStore>, UnboundedReceiver<Notice>) {
    let store = Arc::new(InMemoryAlertStore::new());
    let (notifier, rx) = ChannelNotifier::new();
    let controller = AlertController::new(
        &AlertConfig::default(),
        store.clone(),
        Arc::new(notifier),
        contacts(),
    );
    (controller, store, rx)
}

async fn settle() {
    sleep(Duration::from_millis(5)).await;
}

fn drain(rx: &mut UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(n) = rx.try_recv() {
        notices.push(n);
    }
    notices
}

// ============================================================================
// Lock
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_trigger_storm_arms_exactly_one_alert() {
    let (controller, store, mut rx) = setup();
    let (a, s) = crash(95.0);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let c = controller.clone();
        handles.push(tokio::spawn(async move {
            (0..25).filter(|_| c.on_assessment(&a, &s)).count()
        }));
    }
    let mut armed = 0;
    for h in handles {
        armed += h.await.expect("task");
    }
    settle().await;

    assert_eq!(armed, 1);
    assert_eq!(store.len(), 1);
    assert_eq!(controller.snapshot().stats.suppressed, 199);

    let notices = drain(&mut rx);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NotificationKind::Confirmation);
    assert_eq!(notices[0].recipients, vec!["rider@example.com"]);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_assessments_never_touch_state() {
    let (controller, store, mut rx) = setup();
    let (_, s) = crash(0.0);
    let quiet = Assessment {
        verdict: Verdict { is_accident: false, danger_percentage: 69.0 },
        ..Default::default()
    };
    for _ in 0..100 {
        assert!(!controller.on_assessment(&quiet, &s));
    }
    settle().await;
    assert!(store.is_empty());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(controller.snapshot().stats.suppressed, 0);
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_escalation_after_thirty_seconds() {
    let (controller, store, mut rx) = setup();
    let (a, s) = crash(92.0);
    controller.on_assessment(&a, &s);
    settle().await;
    let id = controller.active_alert().expect("pending").id;

    sleep(Duration::from_secs(29)).await;
    assert_eq!(controller.snapshot().phase, PhaseKind::Pending);

    sleep(Duration::from_secs(2)).await;
    let record = store.get_alert(id).await.expect("get").expect("stored");
    assert_eq!(record.status, AlertStatus::Confirmed);
    assert!(record.notified);
    assert!(!record.user_responded);
    assert!(record.resolved_at.is_some());

    let emergencies: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|n| n.kind == NotificationKind::Emergency)
        .collect();
    assert_eq!(emergencies.len(), 1);
    assert_eq!(emergencies[0].recipients, vec!["mum@example.com", "dad@example.com"]);
    assert_eq!(emergencies[0].record.id, id);
}

#[tokio::test(start_paused = true)]
async fn test_rider_confirm_escalates_immediately() {
    let (controller, store, mut rx) = setup();
    let (a, s) = crash(80.0);
    controller.on_assessment(&a, &s);
    settle().await;
    let id = controller.active_alert().expect("pending").id;

    assert!(matches!(
        controller.confirm(Some(id + 100)),
        Err(Rejected::AlertMismatch { .. })
    ));
    let record = controller.confirm(Some(id)).expect("confirmed");
    assert!(record.user_responded && record.notified);
    settle().await;

    let stored = store.get_alert(id).await.expect("get").expect("stored");
    assert_eq!(stored.status, AlertStatus::Confirmed);
    assert!(drain(&mut rx).iter().any(|n| n.kind == NotificationKind::Emergency));

    // The timer that was running must not escalate a second time
    sleep(Duration::from_secs(60)).await;
    assert!(drain(&mut rx).is_empty());
    assert_eq!(controller.snapshot().stats.confirmed, 1);
}

/// Arms an alert at `t0` and has the rider cancel at `t0 + cancel_at`.
/// The escalation deadline is `t0 + 30 s`.
async fn cancel_near_deadline(
    cancel_at: Duration,
) -> (Result<AlertRecord, Rejected>, AlertRecord, usize, AlertController) {
    let (controller, store, mut rx) = setup();
    let t0 = Instant::now();
    let (a, s) = crash(90.0);
    controller.on_assessment(&a, &s);
    settle().await;
    let id = controller.active_alert().expect("pending").id;

    sleep_until(t0 + cancel_at).await;
    let result = controller.cancel(Some(id));
    sleep(Duration::from_secs(1)).await;

    let stored = store.get_alert(id).await.expect("get").expect("stored");
    let emergencies = drain(&mut rx)
        .iter()
        .filter(|n| n.kind == NotificationKind::Emergency)
        .count();
    (result, stored, emergencies, controller)
}

#[tokio::test(start_paused = true)]
async fn test_cancel_just_before_deadline_wins() {
    let (result, stored, emergencies, controller) =
        cancel_near_deadline(Duration::from_millis(29_990)).await;

    assert!(result.is_ok());
    assert_eq!(stored.status, AlertStatus::Cancelled);
    assert_eq!(emergencies, 0);
    let stats = controller.snapshot().stats;
    assert_eq!((stats.cancelled, stats.confirmed), (1, 0));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_just_after_deadline_is_rejected() {
    let (result, stored, emergencies, controller) =
        cancel_near_deadline(Duration::from_millis(30_010)).await;

    assert_eq!(result, Err(Rejected::NoActiveAlert));
    assert_eq!(stored.status, AlertStatus::Confirmed);
    assert_eq!(emergencies, 1);
    let stats = controller.snapshot().stats;
    assert_eq!((stats.cancelled, stats.confirmed), (0, 1));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_without_alert_is_noop() {
    let (controller, _store, _rx) = setup();
    assert_eq!(controller.cancel(None), Err(Rejected::NoActiveAlert));
    assert_eq!(controller.confirm(Some(3)), Err(Rejected::NoActiveAlert));
    assert!(controller.is_lock_open());
}

// ============================================================================
// Collaborator Failures
// ============================================================================

/// Fails the first `failures` creates, then behaves like the in-memory store.
struct FlakyStore {
    inner: InMemoryAlertStore,
    failures: AtomicUsize,
}

#[async_trait]
impl AlertStore for FlakyStore {
    async fn create_alert(&self, record: &AlertRecord) -> Result<AlertId, StoreError> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Storage("backend unavailable".into()));
        }
        self.inner.create_alert(record).await
    }
    async fn update_alert(&self, id: AlertId, status: AlertStatus, flags: AlertFlags) -> Result<(), StoreError> {
        self.inner.update_alert(id, status, flags).await
    }
    async fn get_alert(&self, id: AlertId) -> Result<Option<AlertRecord>, StoreError> {
        self.inner.get_alert(id).await
    }
    async fn list_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StoreError> {
        self.inner.list_alerts(limit).await
    }
    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_create_leaves_controller_retryable() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryAlertStore::new(),
        failures: AtomicUsize::new(1),
    });
    let (notifier, mut rx) = ChannelNotifier::new();
    let controller = AlertController::new(&AlertConfig::default(), store.clone(), Arc::new(notifier), contacts());
    let (a, s) = crash(95.0);

    assert!(controller.on_assessment(&a, &s));
    settle().await;
    assert!(controller.active_alert().is_none());
    assert!(controller.is_lock_open());
    assert!(drain(&mut rx).is_empty(), "no notice for an alert that was never stored");

    // No timer was started for the failed attempt
    sleep(Duration::from_secs(40)).await;
    assert!(drain(&mut rx).is_empty());

    assert!(controller.on_assessment(&a, &s));
    settle().await;
    assert!(controller.active_alert().is_some());
    assert_eq!(store.inner.len(), 1);
    assert_eq!(controller.snapshot().stats.create_failures, 1);
}

struct BrokenNotifier {
    attempts: AtomicUsize,
}

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify(&self, _: NotificationKind, _: &AlertRecord, _: &[String]) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Delivery("smtp down".into()))
    }
    fn notifier_name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test(start_paused = true)]
async fn test_notify_failure_does_not_block_escalation() {
    let store = Arc::new(InMemoryAlertStore::new());
    let notifier = Arc::new(BrokenNotifier { attempts: AtomicUsize::new(0) });
    let controller = AlertController::new(&AlertConfig::default(), store.clone(), notifier.clone(), contacts());
    let (a, s) = crash(95.0);

    controller.on_assessment(&a, &s);
    settle().await;
    let id = controller.active_alert().expect("pending despite failed confirmation notice").id;

    sleep(Duration::from_secs(31)).await;
    let stored = store.get_alert(id).await.expect("get").expect("stored");
    assert_eq!(stored.status, AlertStatus::Confirmed);
    assert!(stored.notified);
    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 2);

    sleep(Duration::from_secs(5)).await;
    assert!(controller.is_lock_open());
}

#[tokio::test(start_paused = true)]
async fn test_default_contact_receives_both_notices() {
    let store = Arc::new(InMemoryAlertStore::new());
    let (notifier, mut rx) = ChannelNotifier::new();
    let book = ContactBook::new(&ContactsConfig {
        rider: None,
        emergency: Vec::new(),
        default_contact: Some("dispatch@example.com".into()),
    });
    let controller = AlertController::new(&AlertConfig::default(), store, Arc::new(notifier), book);
    let (a, s) = crash(95.0);

    controller.on_assessment(&a, &s);
    settle().await;
    controller.confirm(None).expect("confirm");
    settle().await;

    let notices = drain(&mut rx);
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.recipients == vec!["dispatch@example.com"]));
}
