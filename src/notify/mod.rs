//! Notification dispatch
//!
//! The core hands a notice (kind + record + recipients) to a [`Notifier`]
//! and never waits on the outcome: delivery is best-effort and the alert
//! state machine proceeds regardless. Transport (email, chat, SMS) lives
//! behind the trait.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ContactsConfig;
use crate::types::{AlertRecord, NotificationKind};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("no recipients for {0} notice")]
    NoRecipients(NotificationKind),
}

/// Outbound notification collaborator.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        kind: NotificationKind,
        record: &AlertRecord,
        recipients: &[String],
    ) -> Result<(), NotifyError>;

    /// Name for logging
    fn notifier_name(&self) -> &'static str;
}

// ============================================================================
// Recipient Resolution
// ============================================================================

/// Resolves who receives each kind of notice.
///
/// - Confirmation: the rider, else the default contact
/// - Emergency: every emergency contact, else the default contact
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    rider: Option<String>,
    emergency: Vec<String>,
    default_contact: Option<String>,
}

impl ContactBook {
    pub fn new(config: &ContactsConfig) -> Self {
        fn clean(s: &Option<String>) -> Option<String> {
            s.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(String::from)
        }
        Self {
            rider: clean(&config.rider),
            emergency: config
                .emergency
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            default_contact: clean(&config.default_contact),
        }
    }

    pub fn recipients_for(&self, kind: NotificationKind) -> Vec<String> {
        let specific = match kind {
            NotificationKind::Confirmation => self.rider.iter().cloned().collect::<Vec<_>>(),
            NotificationKind::Emergency => self.emergency.clone(),
        };
        if !specific.is_empty() {
            return specific;
        }
        self.default_contact.iter().cloned().collect()
    }
}

// ============================================================================
// Log Notifier
// ============================================================================

/// Writes notices to the log. Default when no transport is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        record: &AlertRecord,
        recipients: &[String],
    ) -> Result<(), NotifyError> {
        if recipients.is_empty() {
            return Err(NotifyError::NoRecipients(kind));
        }
        match kind {
            NotificationKind::Confirmation => info!(
                alert_id = record.id,
                danger = record.danger_percentage,
                to = %recipients.join(", "),
                "📣 Crash detected: are you okay? Cancel to dismiss"
            ),
            NotificationKind::Emergency => warn!(
                alert_id = record.id,
                danger = record.danger_percentage,
                lat = record.latitude,
                lon = record.longitude,
                to = %recipients.join(", "),
                "🚨 EMERGENCY: rider did not respond"
            ),
        }
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}

// ============================================================================
// Channel Notifier
// ============================================================================

/// A notice as handed to a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub kind: NotificationKind,
    pub record: AlertRecord,
    pub recipients: Vec<String>,
}

/// Forwards notices to an in-process channel (UI front-ends, test harnesses).
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        record: &AlertRecord,
        recipients: &[String],
    ) -> Result<(), NotifyError> {
        self.tx
            .send(Notice {
                kind,
                record: record.clone(),
                recipients: recipients.to_vec(),
            })
            .map_err(|_| NotifyError::Delivery("notice channel closed".to_string()))
    }

    fn notifier_name(&self) -> &'static str {
        "channel"
    }
}
