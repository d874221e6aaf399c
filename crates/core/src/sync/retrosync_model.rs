//! Sheet/database sync domain models.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::cell_value::CellValue;

/// Natural key shared by sheet rows and database rows.
pub const NATURAL_KEY_FIELD: &str = "building_id";
/// Sheet column stamped on every write coming from the database.
pub const SYNCED_AT_FIELD: &str = "DB Synced At";
/// Free-text status column.
pub const STATUS_FIELD: &str = "Status";
/// Status sentinel for soft-deleted rows.
pub const DELETED_STATUS: &str = "Deleted";
/// Checkbox the user ticks to request a soft delete.
pub const DELETE_INTENT_FIELD: &str = "Delete (send to DB)";
/// Checkbox the user ticks to request ingestion of a new building.
pub const ADD_INTENT_FIELD: &str = "Add Building (send to DB)";
/// Sheet column holding the normalized address assigned by the database.
pub const ADDRESS_NORMALIZED_FIELD: &str = "Address Normalized";

/// Maximum number of records the sheet accepts per batch write.
pub const SHEET_MAX_BATCH_SIZE: usize = 50;

/// Target field name -> value to write into one sheet record.
pub type FieldAssignment = BTreeMap<String, CellValue>;

/// Column types understood by the local sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Checkbox,
    DateTime,
}

/// One column of the local sheet schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetField {
    pub name: String,
    pub field_type: FieldType,
}

impl SheetField {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Columns of the building sheet.
pub fn default_building_fields() -> Vec<SheetField> {
    use FieldType::*;
    [
        (NATURAL_KEY_FIELD, Number),
        ("mortgagee_id", Number),
        (ADDRESS_NORMALIZED_FIELD, Text),
        ("Bld#", Number),
        ("Owner Occupied", Checkbox),
        ("Street Address", Text),
        ("City", Text),
        ("State", Text),
        ("Zip", Text),
        ("County", Text),
        ("Units", Number),
        ("construction_code", Text),
        ("Year Built", Number),
        ("Stories", Number),
        ("Square Feet", Number),
        ("Desired Building Coverage", Number),
        ("Fire Alarm", Checkbox),
        ("Sprinkler System", Checkbox),
        ("roof_year_updated", Number),
        ("plumbing_year_updated", Number),
        ("electrical_year_updated", Number),
        ("hvac_year_updated", Number),
        ("entity_id", Number),
        (STATUS_FIELD, Text),
        (DELETE_INTENT_FIELD, Checkbox),
        (ADD_INTENT_FIELD, Checkbox),
        (SYNCED_AT_FIELD, DateTime),
    ]
    .into_iter()
    .map(|(name, field_type)| SheetField::new(name, field_type))
    .collect()
}

/// One row from the database change feed. A missing key means "absent",
/// an explicit `null` is a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRow(pub BTreeMap<String, CellValue>);

impl ChangeRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.0.get(key)
    }

    /// Stringified natural key, or `None` when it is absent or empty.
    pub fn natural_key(&self) -> Option<String> {
        self.get(NATURAL_KEY_FIELD).and_then(CellValue::key_string)
    }
}

/// A change window returned by the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeBatch {
    /// Producer clock at the time the window was cut.
    pub now: DateTime<Utc>,
    pub upserts: Vec<ChangeRow>,
    pub deletes: Vec<ChangeRow>,
}

/// One row of the local sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord {
    /// Store-assigned identifier, immutable once assigned.
    pub id: String,
    pub fields: BTreeMap<String, CellValue>,
}

impl LocalRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    pub fn natural_key(&self) -> Option<String> {
        self.get(NATURAL_KEY_FIELD).and_then(CellValue::key_string)
    }

    pub fn is_checked(&self, field: &str) -> bool {
        self.get(field).map(CellValue::is_truthy).unwrap_or(false)
    }

    /// Cell rendered as text, empty when unset.
    pub fn text(&self, field: &str) -> String {
        self.get(field).map(|value| value.to_string()).unwrap_or_default()
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.text(STATUS_FIELD) == DELETED_STATUS
    }
}

/// Batch create request for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordCreate {
    pub fields: FieldAssignment,
}

/// Batch update request for one record; cells not named are left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: FieldAssignment,
}

/// Persisted retrosync control state.
///
/// Exactly one logical instance per store. `record_id` is `None` until the
/// first successful run creates the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub record_id: Option<String>,
    pub last_cursor: Option<DateTime<Utc>>,
    /// `None` when the lock column does not exist; absence is not a lock.
    pub sync_lock: Option<bool>,
}

impl Watermark {
    pub fn is_locked(&self) -> bool {
        self.sync_lock.unwrap_or(false)
    }

    /// Lower bound for the next feed fetch.
    pub fn since(&self) -> DateTime<Utc> {
        self.last_cursor.unwrap_or_else(epoch)
    }

    pub fn advanced_to(&self, cursor: DateTime<Utc>) -> Self {
        Self {
            record_id: self.record_id.clone(),
            last_cursor: Some(cursor),
            sync_lock: self.sync_lock,
        }
    }
}

pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).single().unwrap_or_default()
}

/// Outcome of one retrosync run, shaped for the invoker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub ok: bool,
    pub updates_applied: usize,
    pub creates_applied: usize,
    pub deletes_applied: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicate_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<DateTime<Utc>>,
}

impl SyncReport {
    /// Early exit that is not a failure (advisory lock, run in progress).
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            ok: true,
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn fetch_failed(status: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            ok: false,
            status,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_skipped_fields(mut self, fields: &BTreeSet<String>) -> Self {
        self.skipped_fields = fields.iter().cloned().collect();
        self
    }

    pub fn total_applied(&self) -> usize {
        self.updates_applied + self.creates_applied + self.deletes_applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_without_cursor_starts_at_epoch() {
        let watermark = Watermark::default();
        assert_eq!(watermark.since().timestamp(), 0);
        assert!(!watermark.is_locked());
    }

    #[test]
    fn advancing_keeps_identity_and_lock() {
        let watermark = Watermark {
            record_id: Some("ctl".to_string()),
            last_cursor: None,
            sync_lock: Some(false),
        };
        let now = Utc.with_ymd_and_hms(2025, 9, 24, 8, 0, 0).unwrap();
        let next = watermark.advanced_to(now);
        assert_eq!(next.record_id.as_deref(), Some("ctl"));
        assert_eq!(next.last_cursor, Some(now));
        assert_eq!(next.sync_lock, Some(false));
    }

    #[test]
    fn report_omits_empty_optional_sections() {
        let report = SyncReport {
            ok: true,
            updates_applied: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "ok": true,
                "updates_applied": 2,
                "creates_applied": 0,
                "deletes_applied": 0,
            })
        );
    }

    #[test]
    fn fetch_failure_report_carries_status() {
        let json = serde_json::to_value(SyncReport::fetch_failed(
            Some(500),
            "changes endpoint failed",
        ))
        .expect("serialize");
        assert_eq!(json["ok"], false);
        assert_eq!(json["status"], 500);
        assert_eq!(json["error"], "changes endpoint failed");
    }

    #[test]
    fn local_record_treats_null_cells_as_unset() {
        let record = LocalRecord::new("rec1")
            .with(STATUS_FIELD, CellValue::Null)
            .with(NATURAL_KEY_FIELD, 7);
        assert_eq!(record.text(STATUS_FIELD), "");
        assert!(!record.is_soft_deleted());
        assert_eq!(record.natural_key().as_deref(), Some("7"));
    }
}
