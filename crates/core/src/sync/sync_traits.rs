//! Collaborator contracts used by the sync services.
//!
//! The local sheet, the watermark record and the building database API are
//! injected behind these traits so the reconciler can be driven by any store
//! (SQLite in production, in-memory fakes in tests).

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::{Error, Result};

use super::cell_value::CellValue;
use super::record_push_model::{ApiCallResult, IngestResponse};
use super::retrosync_model::{
    ChangeBatch, FieldAssignment, LocalRecord, RecordCreate, RecordUpdate, Watermark,
    SHEET_MAX_BATCH_SIZE,
};

/// Tabular record store holding the sheet.
#[async_trait]
pub trait SheetStoreTrait: Send + Sync {
    /// Names of the columns currently defined on the sheet.
    fn field_names(&self) -> Result<HashSet<String>>;

    /// Full scan. With `Some(fields)` only those cells are loaded.
    fn select_records(&self, fields: Option<&[&str]>) -> Result<Vec<LocalRecord>>;

    fn get_record(&self, id: &str) -> Result<Option<LocalRecord>>;

    /// Largest batch accepted by `update_records` / `create_records`.
    fn max_batch_size(&self) -> usize {
        SHEET_MAX_BATCH_SIZE
    }

    /// Applies a batch atomically; cells not named are left untouched.
    async fn update_records(&self, updates: Vec<RecordUpdate>) -> Result<()>;

    /// Creates a batch atomically and returns the new ids in input order.
    async fn create_records(&self, creates: Vec<RecordCreate>) -> Result<Vec<String>>;

    async fn update_record(&self, id: &str, fields: FieldAssignment) -> Result<()> {
        self.update_records(vec![RecordUpdate {
            id: id.to_string(),
            fields,
        }])
        .await
    }

    async fn create_record(&self, fields: FieldAssignment) -> Result<String> {
        let ids = self.create_records(vec![RecordCreate { fields }]).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| Error::store("create returned no record id"))
    }
}

/// Persistence of the single retrosync control record.
#[async_trait]
pub trait WatermarkStoreTrait: Send + Sync {
    /// Current state; a default watermark when the record does not exist yet.
    fn load_watermark(&self) -> Result<Watermark>;

    /// Persists the cursor. Creates the record when none exists yet; otherwise
    /// updates the existing one and leaves its stored lock untouched.
    async fn save_watermark(&self, watermark: Watermark) -> Result<Watermark>;

    async fn set_sync_lock(&self, locked: bool) -> Result<Watermark>;
}

/// Incremental change feed of the building database.
#[async_trait]
pub trait ChangeFeedTrait: Send + Sync {
    async fn fetch_changes(&self, since: DateTime<Utc>) -> Result<ChangeBatch>;
}

/// Single-record write endpoints of the building database.
#[async_trait]
pub trait BuildingApiTrait: Send + Sync {
    async fn ingest_building(&self, fields: FieldAssignment) -> Result<IngestResponse>;

    async fn update_building(&self, fields: FieldAssignment) -> Result<ApiCallResult>;

    async fn delete_building(&self, building_id: CellValue) -> Result<ApiCallResult>;

    async fn restore_building(&self, building_id: CellValue) -> Result<ApiCallResult>;
}
