//! Repository for the building sheet tables.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::debug;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};

use sheetsync_core::errors::{Error, Result};
use sheetsync_core::sync::{
    FieldAssignment, FieldType, LocalRecord, RecordCreate, RecordUpdate, SheetField,
    SheetStoreTrait, SHEET_MAX_BATCH_SIZE,
};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{sheet_fields, sheet_records};

use super::model::{decode_cell, encode_cell, field_type_to_db, SheetFieldDB, SheetRecordDB};

const RECORD_ID_PREFIX: &str = "rec";
const RECORD_ID_SUFFIX_LEN: usize = 14;

pub(crate) fn new_record_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RECORD_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", RECORD_ID_PREFIX, suffix)
}

fn load_field_types(conn: &mut SqliteConnection) -> Result<HashMap<String, FieldType>> {
    sheet_fields::table
        .load::<SheetFieldDB>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .map(|row| {
            let field = row.into_domain()?;
            Ok((field.name, field.field_type))
        })
        .collect()
}

fn check_batch_size(len: usize) -> Result<()> {
    if len > SHEET_MAX_BATCH_SIZE {
        return Err(Error::store(format!(
            "Batch of {} records exceeds the limit of {}",
            len, SHEET_MAX_BATCH_SIZE
        )));
    }
    Ok(())
}

fn parse_cells(row: &SheetRecordDB) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(&row.fields)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::store(format!(
            "Record {} has malformed cell data",
            row.id
        ))),
    }
}

/// Merges `assignment` into `cells`, validating names and types.
fn merge_cells(
    cells: &mut Map<String, Value>,
    assignment: &FieldAssignment,
    field_types: &HashMap<String, FieldType>,
) -> Result<()> {
    for (name, value) in assignment {
        let field_type = field_types
            .get(name)
            .copied()
            .ok_or_else(|| Error::store(format!("Unknown field name: \"{}\"", name)))?;
        match encode_cell(name, field_type, value)? {
            Some(encoded) => {
                cells.insert(name.clone(), encoded);
            }
            None => {
                cells.remove(name);
            }
        }
    }
    Ok(())
}

fn to_local_record(
    row: SheetRecordDB,
    field_types: &HashMap<String, FieldType>,
    only: Option<&HashSet<&str>>,
) -> Result<LocalRecord> {
    let cells = parse_cells(&row)?;
    let fields = cells
        .iter()
        .filter(|(name, _)| only.map_or(true, |wanted| wanted.contains(name.as_str())))
        .map(|(name, value)| {
            (
                name.clone(),
                decode_cell(field_types.get(name).copied(), value),
            )
        })
        .collect();
    Ok(LocalRecord { id: row.id, fields })
}

pub struct SheetRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SheetRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    /// Columns in display order.
    pub fn list_fields(&self) -> Result<Vec<SheetField>> {
        let mut conn = get_connection(&self.pool)?;
        sheet_fields::table
            .order(sheet_fields::position.asc())
            .load::<SheetFieldDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(SheetFieldDB::into_domain)
            .collect()
    }

    /// Adds the columns that do not exist yet; existing ones keep their type.
    /// Returns the number of columns added.
    pub async fn ensure_fields(&self, fields: Vec<SheetField>) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let last_position = sheet_fields::table
                    .select(max(sheet_fields::position))
                    .first::<Option<i32>>(conn)
                    .map_err(StorageError::from)?
                    .unwrap_or(0);

                let mut added = 0;
                for field in fields {
                    let row = SheetFieldDB {
                        name: field.name,
                        field_type: field_type_to_db(field.field_type)?,
                        position: last_position + added as i32 + 1,
                    };
                    added += diesel::insert_or_ignore_into(sheet_fields::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                if added > 0 {
                    debug!("Added {} sheet columns", added);
                }
                Ok(added)
            })
            .await
    }

    fn field_types(&self) -> Result<HashMap<String, FieldType>> {
        let mut conn = get_connection(&self.pool)?;
        load_field_types(&mut conn)
    }
}

#[async_trait]
impl SheetStoreTrait for SheetRepository {
    fn field_names(&self) -> Result<HashSet<String>> {
        Ok(self.field_types()?.into_keys().collect())
    }

    fn select_records(&self, fields: Option<&[&str]>) -> Result<Vec<LocalRecord>> {
        let field_types = self.field_types()?;
        let only: Option<HashSet<&str>> = fields.map(|names| names.iter().copied().collect());

        let mut conn = get_connection(&self.pool)?;
        sheet_records::table
            .order(sheet_records::seq.asc())
            .load::<SheetRecordDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(|row| to_local_record(row, &field_types, only.as_ref()))
            .collect()
    }

    fn get_record(&self, record_id: &str) -> Result<Option<LocalRecord>> {
        let field_types = self.field_types()?;
        let mut conn = get_connection(&self.pool)?;
        sheet_records::table
            .find(record_id)
            .first::<SheetRecordDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(|row| to_local_record(row, &field_types, None))
            .transpose()
    }

    async fn update_records(&self, updates: Vec<RecordUpdate>) -> Result<()> {
        check_batch_size(updates.len())?;
        self.writer
            .exec(move |conn| {
                let field_types = load_field_types(conn)?;
                let now = Utc::now().to_rfc3339();

                for update in &updates {
                    let row = sheet_records::table
                        .find(&update.id)
                        .first::<SheetRecordDB>(conn)
                        .optional()
                        .map_err(StorageError::from)?
                        .ok_or_else(|| {
                            Error::store(format!("Record not found: {}", update.id))
                        })?;

                    let mut cells = parse_cells(&row)?;
                    merge_cells(&mut cells, &update.fields, &field_types)?;

                    diesel::update(sheet_records::table.find(&update.id))
                        .set((
                            sheet_records::fields.eq(Value::Object(cells).to_string()),
                            sheet_records::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                debug!("Updated {} sheet records", updates.len());
                Ok(())
            })
            .await
    }

    async fn create_records(&self, creates: Vec<RecordCreate>) -> Result<Vec<String>> {
        check_batch_size(creates.len())?;
        self.writer
            .exec(move |conn| {
                let field_types = load_field_types(conn)?;
                let now = Utc::now().to_rfc3339();
                let mut next_seq = sheet_records::table
                    .select(max(sheet_records::seq))
                    .first::<Option<i64>>(conn)
                    .map_err(StorageError::from)?
                    .unwrap_or(0);

                let mut ids = Vec::with_capacity(creates.len());
                for create in &creates {
                    let mut cells = Map::new();
                    merge_cells(&mut cells, &create.fields, &field_types)?;
                    next_seq += 1;

                    let row = SheetRecordDB {
                        id: new_record_id(),
                        seq: next_seq,
                        fields: Value::Object(cells).to_string(),
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    diesel::insert_into(sheet_records::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    ids.push(row.id);
                }
                debug!("Created {} sheet records", ids.len());
                Ok(ids)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sheetsync_core::sync::{
        default_building_fields, CellValue, DELETE_INTENT_FIELD, NATURAL_KEY_FIELD,
        SYNCED_AT_FIELD,
    };
    use tempfile::tempdir;

    use crate::db::{create_pool, init, run_migrations, write_actor::spawn_writer};

    async fn setup_sheet() -> SheetRepository {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        let sheet = SheetRepository::new(pool, writer);
        sheet
            .ensure_fields(default_building_fields())
            .await
            .expect("provision columns");
        sheet
    }

    fn assignment(cells: &[(&str, CellValue)]) -> FieldAssignment {
        cells
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn ensure_fields_is_idempotent_and_ordered() {
        let sheet = setup_sheet().await;
        let added = sheet
            .ensure_fields(default_building_fields())
            .await
            .expect("second provision");
        assert_eq!(added, 0);

        let fields = sheet.list_fields().expect("fields");
        assert_eq!(fields.len(), default_building_fields().len());
        assert_eq!(fields[0].name, NATURAL_KEY_FIELD);
        assert!(sheet.field_names().unwrap().contains(SYNCED_AT_FIELD));
    }

    #[tokio::test]
    async fn creates_and_reads_typed_records() {
        let sheet = setup_sheet().await;
        let synced = Utc.with_ymd_and_hms(2025, 9, 24, 12, 0, 0).unwrap();

        let ids = sheet
            .create_records(vec![
                RecordCreate {
                    fields: assignment(&[
                        (NATURAL_KEY_FIELD, CellValue::Integer(100)),
                        ("City", CellValue::from("Chicago")),
                        (SYNCED_AT_FIELD, CellValue::Timestamp(synced)),
                    ]),
                },
                RecordCreate {
                    fields: assignment(&[("Sprinkler System", CellValue::Bool(true))]),
                },
            ])
            .await
            .expect("create");

        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| id.starts_with("rec") && id.len() == 17));

        let first = sheet.get_record(&ids[0]).unwrap().expect("first record");
        assert_eq!(first.natural_key().as_deref(), Some("100"));
        assert_eq!(first.get(SYNCED_AT_FIELD), Some(&CellValue::Timestamp(synced)));

        let second = sheet.get_record(&ids[1]).unwrap().expect("second record");
        assert!(second.is_checked("Sprinkler System"));

        let keys_only = sheet.select_records(Some(&[NATURAL_KEY_FIELD])).unwrap();
        assert_eq!(keys_only.len(), 2);
        assert_eq!(keys_only[0].id, ids[0]);
        assert_eq!(keys_only[0].fields.len(), 1);
        assert!(keys_only[1].fields.is_empty());
    }

    #[tokio::test]
    async fn updates_merge_and_null_clears() {
        let sheet = setup_sheet().await;
        let id = sheet
            .create_record(assignment(&[
                (NATURAL_KEY_FIELD, CellValue::Integer(7)),
                ("City", CellValue::from("Old")),
                ("County", CellValue::from("Cook")),
            ]))
            .await
            .expect("create");

        sheet
            .update_record(
                &id,
                assignment(&[
                    ("City", CellValue::from("New")),
                    ("County", CellValue::Null),
                    (DELETE_INTENT_FIELD, CellValue::Bool(true)),
                ]),
            )
            .await
            .expect("update");

        let record = sheet.get_record(&id).unwrap().expect("record");
        assert_eq!(record.get("City"), Some(&CellValue::from("New")));
        assert_eq!(record.get("County"), None);
        assert_eq!(record.natural_key().as_deref(), Some("7"));
        assert!(record.is_checked(DELETE_INTENT_FIELD));
    }

    #[tokio::test]
    async fn rejected_batch_leaves_store_untouched() {
        let sheet = setup_sheet().await;
        let id = sheet
            .create_record(assignment(&[("City", CellValue::from("Before"))]))
            .await
            .expect("create");

        let err = sheet
            .update_records(vec![
                RecordUpdate {
                    id: id.clone(),
                    fields: assignment(&[("City", CellValue::from("After"))]),
                },
                RecordUpdate {
                    id: "recDoesNotExist00".to_string(),
                    fields: assignment(&[("City", CellValue::from("X"))]),
                },
            ])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Record not found"));

        let err = sheet
            .update_record(&id, assignment(&[("Colour", CellValue::from("red"))]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown field name"));

        let record = sheet.get_record(&id).unwrap().expect("record");
        assert_eq!(record.get("City"), Some(&CellValue::from("Before")));
    }

    #[tokio::test]
    async fn oversized_batches_are_rejected() {
        let sheet = setup_sheet().await;
        let creates = (0..=SHEET_MAX_BATCH_SIZE)
            .map(|_| RecordCreate {
                fields: FieldAssignment::new(),
            })
            .collect();

        let err = sheet.create_records(creates).await.unwrap_err();

        assert!(matches!(err, Error::Store(_)));
        assert!(sheet.select_records(None).unwrap().is_empty());
    }

    #[test]
    fn record_ids_have_sheet_shape() {
        let id = new_record_id();
        assert!(id.starts_with("rec"));
        assert_eq!(id.len(), 17);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
