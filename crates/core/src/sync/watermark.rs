//! Cursor gate for retrosync runs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;

use crate::errors::Result;

use super::retrosync_model::Watermark;
use super::sync_traits::WatermarkStoreTrait;

/// Where a run stands after reading the control record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatermarkGate {
    /// Advisory lock is set; the run must end without touching anything.
    Locked,
    /// Run may proceed, fetching changes since `since`.
    Open {
        watermark: Watermark,
        since: DateTime<Utc>,
    },
}

impl WatermarkGate {
    pub fn evaluate(watermark: Watermark) -> Self {
        if watermark.is_locked() {
            return Self::Locked;
        }
        let since = watermark.since();
        Self::Open { watermark, since }
    }
}

/// Reads and advances the persisted cursor.
#[derive(Clone)]
pub struct WatermarkController {
    store: Arc<dyn WatermarkStoreTrait>,
}

impl WatermarkController {
    pub fn new(store: Arc<dyn WatermarkStoreTrait>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Result<Watermark> {
        self.store.load_watermark()
    }

    /// Persists an advanced watermark.
    ///
    /// Only called once every operation of the run has been applied. Creates
    /// the control record on the first successful run.
    pub async fn persist(&self, advanced: Watermark) -> Result<Watermark> {
        if advanced.record_id.is_none() {
            debug!(
                "Creating retrosync control record at cursor {:?}",
                advanced.last_cursor
            );
        }
        self.store.save_watermark(advanced).await
    }

    pub async fn set_lock(&self, locked: bool) -> Result<Watermark> {
        self.store.set_sync_lock(locked).await
    }
}
