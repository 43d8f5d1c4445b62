//! Alert Persistence
//!
//! The alert controller only sees the [`AlertStore`] trait. The backend is
//! picked once at startup from `[storage]` in the config.

pub mod persistence;
mod sled_store;

pub use persistence::{AlertStore, InMemoryAlertStore, StoreError};
pub use sled_store::SledAlertStore;

use std::sync::Arc;

use crate::config::StorageConfig;

/// Open the configured backend: sled when a path is set, memory otherwise.
pub fn open_store(config: &StorageConfig) -> Result<Arc<dyn AlertStore>, StoreError> {
    let store: Arc<dyn AlertStore> = if config.path.trim().is_empty() {
        Arc::new(InMemoryAlertStore::new())
    } else {
        Arc::new(SledAlertStore::open(config.path.trim())?)
    };
    tracing::info!(backend = store.backend_name(), "Alert store ready");
    Ok(store)
}
