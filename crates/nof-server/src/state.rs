use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use nof_core::{ActionRegistry, ActivityLog, Database};
use serde::Serialize;

use crate::config::{NodeConfig, Role};

// ---------------------------------------------------------------------------
// Sync status
// ---------------------------------------------------------------------------

/// `init` until the first exchange this node takes part in, then the
/// outcome of the most recent one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Init,
    Synced,
    Oosync,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct SyncTracker {
    inner: Mutex<SyncSnapshot>,
    /// Lease received from the northbound peer, acknowledged on the next
    /// exchange.
    lease: Mutex<Option<Uuid>>,
}

impl SyncTracker {
    pub fn mark_synced(&self) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.status = SyncStatus::Synced;
        s.last_synced_at = Some(Utc::now());
        s.last_error = None;
    }

    pub fn mark_failed(&self, error: impl Into<String>) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.status = SyncStatus::Oosync;
        s.last_error = Some(error.into());
    }

    pub fn lease_to_ack(&self) -> Option<Uuid> {
        *self.lease.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_lease_to_ack(&self, lease: Option<Uuid>) {
        *self.lease.lock().unwrap_or_else(PoisonError::into_inner) = lease;
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared state handed to every handler and to the sync loop.
#[derive(Clone)]
pub struct AppState {
    pub role: Role,
    pub db: Database,
    pub log: Arc<ActivityLog>,
    pub sync: Arc<SyncTracker>,
}

impl AppState {
    /// Open the tier's database, create its tables and wire the activity
    /// log with the standard handlers.
    pub fn open(config: &NodeConfig) -> nof_core::Result<Self> {
        let db = Database::open_with_pool_size(&config.db_path, config.pool_size)?;
        nof_core::schema::setup_all_tables(&db)?;
        let log = ActivityLog::new(
            db.clone(),
            config.role.name(),
            ActionRegistry::with_model_handlers(),
            config.staging(),
        )?;
        tracing::info!(
            role = %config.role,
            db = %config.db_path.display(),
            "opened node state"
        );
        Ok(Self::from_log(config.role, log))
    }

    pub fn from_log(role: Role, log: ActivityLog) -> Self {
        Self {
            role,
            db: log.database().clone(),
            log: Arc::new(log),
            sync: Arc::new(SyncTracker::default()),
        }
    }
}
