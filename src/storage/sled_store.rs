//! Alert history on sled.
//!
//! Key: alert id as u64 big-endian bytes (sorts in creation order).
//! Value: JSON-serialized `AlertRecord`.
//!
//! Writes are not flushed individually; sled flushes in the background and a
//! crash loses at most the last few writes.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::persistence::{apply_update, AlertStore, StoreError};
use crate::types::{AlertFlags, AlertId, AlertRecord, AlertStatus};

#[derive(Clone)]
pub struct SledAlertStore {
    db: Arc<sled::Db>,
}

impl SledAlertStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn read(&self, id: AlertId) -> Result<Option<AlertRecord>, StoreError> {
        match self.db.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AlertStore for SledAlertStore {
    async fn create_alert(&self, record: &AlertRecord) -> Result<AlertId, StoreError> {
        // generate_id starts at 0; keep 0 meaning "unassigned"
        let id = self.db.generate_id()? + 1;
        let mut stored = record.clone();
        stored.id = id;
        self.db.insert(id.to_be_bytes(), serde_json::to_vec(&stored)?)?;
        Ok(id)
    }

    async fn update_alert(
        &self,
        id: AlertId,
        status: AlertStatus,
        flags: AlertFlags,
    ) -> Result<(), StoreError> {
        let mut record = self.read(id)?.ok_or(StoreError::NotFound(id))?;
        apply_update(&mut record, status, flags);
        self.db.insert(id.to_be_bytes(), serde_json::to_vec(&record)?)?;
        Ok(())
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<AlertRecord>, StoreError> {
        self.read(id)
    }

    async fn list_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StoreError> {
        let mut records = Vec::with_capacity(limit.min(64));
        for item in self.db.iter().rev() {
            if records.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            match serde_json::from_slice::<AlertRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable alert record"),
            }
        }
        Ok(records)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Vec3;
    use chrono::Utc;

    fn record() -> AlertRecord {
        AlertRecord {
            id: 0,
            latitude: 1.0,
            longitude: 2.0,
            danger_percentage: 100.0,
            raw_accident: Vec3::new(0.0, 0.0, -1.0),
            raw_gyro: Vec3::ZERO,
            status: AlertStatus::Pending,
            user_responded: false,
            notified: false,
            rollover: true,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn test_create_update_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("alerts.db");

        let id = {
            let store = SledAlertStore::open(&path).expect("open");
            let id = store.create_alert(&record()).await.expect("create");
            assert!(id > 0);
            store
                .update_alert(id, AlertStatus::Confirmed, AlertFlags { user_responded: false, notified: true })
                .await
                .expect("update");
            store.db.flush().expect("flush");
            id
        };

        let store = SledAlertStore::open(&path).expect("reopen");
        let rec = store.get_alert(id).await.expect("get").expect("exists");
        assert_eq!(rec.status, AlertStatus::Confirmed);
        assert!(rec.notified);
        assert!(rec.rollover);
        assert_eq!(store.list_alerts(10).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SledAlertStore::open(dir.path().join("alerts.db")).expect("open");
        let err = store
            .update_alert(7, AlertStatus::Cancelled, AlertFlags::default())
            .await
            .expect_err("missing");
        assert!(matches!(err, StoreError::NotFound(7)));
    }
}
