//! AlertStore trait: pluggable persistence backend
//!
//! Abstracts alert record persistence so backends can be swapped without
//! touching the alert controller:
//! - `InMemoryAlertStore`: for tests and runs without a data directory
//! - `SledAlertStore`: durable local store

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::types::{AlertFlags, AlertId, AlertRecord, AlertStatus};

/// Persistence collaborator for alert records.
///
/// Used once to create a record (Pending) and at most once more to move it
/// to Confirmed or Cancelled. Implementations must be `Send + Sync`; calls
/// are issued from spawned tasks.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Store a new record and return its assigned id.
    async fn create_alert(&self, record: &AlertRecord) -> Result<AlertId, StoreError>;

    /// Record the final status and flags for an existing alert.
    async fn update_alert(
        &self,
        id: AlertId,
        status: AlertStatus,
        flags: AlertFlags,
    ) -> Result<(), StoreError>;

    /// Fetch a record by id.
    async fn get_alert(&self, id: AlertId) -> Result<Option<AlertRecord>, StoreError>;

    /// Most recent records first.
    async fn list_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("alert {0} not found")]
    NotFound(AlertId),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// In-memory store. Thread-safe via `RwLock`, not durable.
pub struct InMemoryAlertStore {
    alerts: RwLock<Vec<AlertRecord>>,
    next_id: AtomicU64,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.alerts.read().map_or(0, |a| a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn create_alert(&self, record: &AlertRecord) -> Result<AlertId, StoreError> {
        let mut store = self
            .alerts
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut stored = record.clone();
        stored.id = id;
        store.push(stored);
        Ok(id)
    }

    async fn update_alert(
        &self,
        id: AlertId,
        status: AlertStatus,
        flags: AlertFlags,
    ) -> Result<(), StoreError> {
        let mut store = self
            .alerts
            .write()
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        let record = store
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::NotFound(id))?;
        apply_update(record, status, flags);
        Ok(())
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<AlertRecord>, StoreError> {
        let store = self
            .alerts
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(store.iter().find(|a| a.id == id).cloned())
    }

    async fn list_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StoreError> {
        let store = self
            .alerts
            .read()
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        Ok(store.iter().rev().take(limit).cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

/// Shared by every backend so status updates look the same everywhere.
pub(crate) fn apply_update(record: &mut AlertRecord, status: AlertStatus, flags: AlertFlags) {
    record.status = status;
    record.user_responded = flags.user_responded;
    record.notified = flags.notified;
    if status != AlertStatus::Pending && record.resolved_at.is_none() {
        record.resolved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;

    fn pending_record() -> AlertRecord {
        AlertRecord {
            id: 0,
            latitude: 59.9,
            longitude: 10.7,
            danger_percentage: 92.0,
            raw_accident: Vec3::new(0.0, 0.0, 6.0),
            raw_gyro: Vec3::ZERO,
            status: AlertStatus::Pending,
            user_responded: false,
            notified: false,
            rollover: false,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = InMemoryAlertStore::new();
        let a = store.create_alert(&pending_record()).await.expect("create");
        let b = store.create_alert(&pending_record()).await.expect("create");
        assert!(b > a);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_update_sets_status_and_flags() {
        let store = InMemoryAlertStore::new();
        let id = store.create_alert(&pending_record()).await.expect("create");
        store
            .update_alert(
                id,
                AlertStatus::Cancelled,
                AlertFlags { user_responded: true, notified: false },
            )
            .await
            .expect("update");

        let rec = store.get_alert(id).await.expect("get").expect("exists");
        assert_eq!(rec.status, AlertStatus::Cancelled);
        assert!(rec.user_responded);
        assert!(rec.resolved_at.is_some());
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let store = InMemoryAlertStore::new();
        let err = store
            .update_alert(99, AlertStatus::Confirmed, AlertFlags::default())
            .await
            .expect_err("missing id");
        assert!(matches!(err, StoreError::NotFound(99)));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let store = InMemoryAlertStore::new();
        for _ in 0..3 {
            store.create_alert(&pending_record()).await.expect("create");
        }
        let ids: Vec<_> = store.list_alerts(2).await.expect("list").iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 2]);
    }
}
