//! Single-record pushes from the sheet to the building database.
//!
//! Each operation is driven by a checkbox on one sheet record: soft delete /
//! restore, ingestion of a new building, and field update propagation.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};

use crate::errors::Result;

use super::cell_value::CellValue;
use super::field_mapper::BUILDING_FIELD_MAP;
use super::record_push_model::{
    IngestOutcome, PushUpdateOutcome, SoftDeleteAction, SoftDeleteOutcome,
};
use super::retrosync_model::{
    FieldAssignment, LocalRecord, ADDRESS_NORMALIZED_FIELD, ADD_INTENT_FIELD, DELETED_STATUS,
    DELETE_INTENT_FIELD, NATURAL_KEY_FIELD, STATUS_FIELD, SYNCED_AT_FIELD,
};
use super::sync_traits::{BuildingApiTrait, SheetStoreTrait};

pub const SKIPPED_ALREADY_INGESTED: &str = "already has building_id";
pub const MISSING_KEY_FOR_UPDATE: &str = "Missing building_id on Airtable record";

/// Database-only columns sent on update in addition to the mapped ones.
const UPDATE_EXTRA_SOURCES: [&str; 1] = ["mortgagee_id"];

pub struct RecordPushService {
    sheet: Arc<dyn SheetStoreTrait>,
    api: Arc<dyn BuildingApiTrait>,
}

impl RecordPushService {
    pub fn new(sheet: Arc<dyn SheetStoreTrait>, api: Arc<dyn BuildingApiTrait>) -> Self {
        Self { sheet, api }
    }

    /// Reconciles the delete checkbox of `record_id` with the database.
    ///
    /// - checked and not yet `Deleted`: soft delete in the database, then mark the row
    /// - unchecked and `Deleted`: restore in the database, then clear the status
    /// - anything else: no-op
    ///
    /// When the database call fails the checkbox is reverted so the sheet shows
    /// the actual state.
    pub async fn toggle_soft_delete(&self, record_id: &str) -> Result<SoftDeleteOutcome> {
        let Some(record) = self.sheet.get_record(record_id)? else {
            return Ok(SoftDeleteOutcome::failed(format!(
                "Record {} not found",
                record_id
            )));
        };
        let Some(building_id) = record
            .natural_key()
            .and(record.get(NATURAL_KEY_FIELD).cloned())
        else {
            return Ok(SoftDeleteOutcome::failed("missing building_id"));
        };

        let wants_delete = record.is_checked(DELETE_INTENT_FIELD);
        let is_deleted = record.is_soft_deleted();

        let action = match (wants_delete, is_deleted) {
            (true, false) => SoftDeleteAction::Delete,
            (false, true) => SoftDeleteAction::Restore,
            _ => return Ok(SoftDeleteOutcome::noop()),
        };

        let response = match action {
            SoftDeleteAction::Delete => self.api.delete_building(building_id).await,
            _ => self.api.restore_building(building_id).await,
        };

        let mut stamp = FieldAssignment::new();
        let outcome = match response {
            Ok(result) => {
                if action == SoftDeleteAction::Delete {
                    stamp.insert(DELETE_INTENT_FIELD.to_string(), CellValue::Bool(true));
                    stamp.insert(STATUS_FIELD.to_string(), CellValue::from(DELETED_STATUS));
                } else {
                    stamp.insert(DELETE_INTENT_FIELD.to_string(), CellValue::Bool(false));
                    stamp.insert(STATUS_FIELD.to_string(), CellValue::Null);
                }
                SoftDeleteOutcome {
                    ok: true,
                    action,
                    status: Some(result.status),
                    error: None,
                }
            }
            Err(err) => {
                warn!("{:?} of record {} failed: {}", action, record_id, err);
                stamp.insert(
                    DELETE_INTENT_FIELD.to_string(),
                    CellValue::Bool(action == SoftDeleteAction::Restore),
                );
                SoftDeleteOutcome {
                    ok: false,
                    action,
                    status: err.status_code(),
                    error: Some(err.to_string()),
                }
            }
        };

        stamp.insert(
            SYNCED_AT_FIELD.to_string(),
            CellValue::Timestamp(Utc::now()),
        );
        self.sheet.update_record(&record.id, stamp).await?;
        Ok(outcome)
    }

    /// Sends a sheet record without a building id to the ingest endpoint and
    /// writes the assigned id back.
    ///
    /// Records that already carry a building id are never sent again.
    pub async fn ingest_record(&self, record_id: &str) -> Result<IngestOutcome> {
        let Some(record) = self.sheet.get_record(record_id)? else {
            return Ok(IngestOutcome {
                ok: false,
                error: Some(format!("Record {} not found", record_id)),
                ..Default::default()
            });
        };

        if record.natural_key().is_some() {
            self.uncheck(&record, ADD_INTENT_FIELD).await?;
            return Ok(IngestOutcome {
                ok: true,
                building_id: record.get(NATURAL_KEY_FIELD).and_then(CellValue::as_i64),
                address_normalized: record
                    .get(ADDRESS_NORMALIZED_FIELD)
                    .map(|value| value.to_string()),
                skipped: Some(SKIPPED_ALREADY_INGESTED.to_string()),
                ..Default::default()
            });
        }

        let fields: FieldAssignment = record
            .fields
            .iter()
            .filter(|(_, value)| !value.is_null())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        let fallback_address = record
            .get(ADDRESS_NORMALIZED_FIELD)
            .map(|value| value.to_string());

        match self.api.ingest_building(fields).await {
            Ok(response) => {
                let address = response.address_normalized.clone().or(fallback_address);
                let mut write_back = FieldAssignment::new();
                write_back.insert(ADD_INTENT_FIELD.to_string(), CellValue::Bool(false));
                write_back.insert(
                    SYNCED_AT_FIELD.to_string(),
                    CellValue::Timestamp(Utc::now()),
                );
                if let Some(id) = response.building_id {
                    write_back.insert(NATURAL_KEY_FIELD.to_string(), CellValue::Integer(id));
                }
                if let Some(address) = &address {
                    write_back.insert(
                        ADDRESS_NORMALIZED_FIELD.to_string(),
                        CellValue::from(address.as_str()),
                    );
                }
                self.write_known(&record.id, write_back).await?;
                debug!(
                    "Ingested record {} as building {:?}",
                    record.id, response.building_id
                );
                Ok(IngestOutcome {
                    ok: true,
                    building_id: response.building_id,
                    address_normalized: address,
                    status: Some(response.status),
                    ..Default::default()
                })
            }
            Err(err) => {
                warn!("Ingest of record {} failed: {}", record.id, err);
                self.uncheck(&record, ADD_INTENT_FIELD).await?;
                Ok(IngestOutcome {
                    ok: false,
                    address_normalized: fallback_address,
                    status: err.status_code(),
                    error: Some(err.to_string()),
                    ..Default::default()
                })
            }
        }
    }

    /// Sends the record's building fields to the update endpoint, keyed by
    /// database column names.
    pub async fn push_update(&self, record_id: &str) -> Result<PushUpdateOutcome> {
        let Some(record) = self.sheet.get_record(record_id)? else {
            return Ok(PushUpdateOutcome {
                ok: false,
                error: Some(format!("Record {} not found", record_id)),
                ..Default::default()
            });
        };
        if record.get(NATURAL_KEY_FIELD).is_none() {
            return Ok(PushUpdateOutcome {
                ok: false,
                error: Some(MISSING_KEY_FOR_UPDATE.to_string()),
                ..Default::default()
            });
        }

        let payload = update_payload(&record);
        match self.api.update_building(payload).await {
            Ok(result) => Ok(PushUpdateOutcome {
                ok: true,
                status: Some(result.status),
                api_result: Some(result.body),
                synced_at: Some(Utc::now()),
                error: None,
            }),
            Err(err) => {
                warn!("Update push of record {} failed: {}", record.id, err);
                Ok(PushUpdateOutcome {
                    ok: false,
                    status: err.status_code(),
                    api_result: None,
                    synced_at: Some(Utc::now()),
                    error: Some(err.to_string()),
                })
            }
        }
    }

    async fn uncheck(&self, record: &LocalRecord, field: &str) -> Result<()> {
        let mut fields = FieldAssignment::new();
        fields.insert(field.to_string(), CellValue::Bool(false));
        self.write_known(&record.id, fields).await
    }

    /// Writes only the cells the sheet has columns for.
    async fn write_known(&self, record_id: &str, mut fields: FieldAssignment) -> Result<()> {
        let known = self.sheet.field_names()?;
        fields.retain(|name, _| known.contains(name));
        if fields.is_empty() {
            return Ok(());
        }
        self.sheet.update_record(record_id, fields).await
    }
}

/// Database-named payload for the update endpoint. Empty cells are sent as null.
fn update_payload(record: &LocalRecord) -> FieldAssignment {
    let mut payload = FieldAssignment::new();
    for (source, target) in BUILDING_FIELD_MAP {
        let value = record.get(target).cloned().unwrap_or(CellValue::Null);
        payload.insert(source.to_string(), value);
    }
    for source in UPDATE_EXTRA_SOURCES {
        let value = record.get(source).cloned().unwrap_or(CellValue::Null);
        payload.insert(source.to_string(), value);
    }
    payload
}
