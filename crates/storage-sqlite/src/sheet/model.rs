//! Database models for the sheet tables and the cell codec.

use chrono::SecondsFormat;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sheetsync_core::errors::{Error, Result};
use sheetsync_core::sync::{CellValue, FieldType, SheetField};

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone, Serialize, Deserialize)]
#[diesel(primary_key(name))]
#[diesel(table_name = crate::schema::sheet_fields)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SheetFieldDB {
    pub name: String,
    pub field_type: String,
    pub position: i32,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sheet_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SheetRecordDB {
    pub id: String,
    pub seq: i64,
    /// JSON object of non-empty cells.
    pub fields: String,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) fn field_type_to_db(field_type: FieldType) -> Result<String> {
    Ok(serde_json::to_string(&field_type)?.trim_matches('"').to_string())
}

pub(crate) fn field_type_from_db(value: &str) -> Result<FieldType> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

impl SheetFieldDB {
    pub fn into_domain(self) -> Result<SheetField> {
        Ok(SheetField::new(self.name, field_type_from_db(&self.field_type)?))
    }
}

fn type_mismatch(name: &str, field_type: FieldType, value: &CellValue) -> Error {
    Error::store(format!(
        "Cannot store {:?} in {:?} field \"{}\"",
        value, field_type, name
    ))
}

/// Converts a cell for storage. `None` clears the cell.
///
/// Unchecked checkboxes are stored as empty, like the hosted sheet does.
pub(crate) fn encode_cell(
    name: &str,
    field_type: FieldType,
    value: &CellValue,
) -> Result<Option<Value>> {
    if value.is_null() {
        return Ok(None);
    }
    let encoded = match field_type {
        FieldType::Text => match value.to_string() {
            text if text.is_empty() => return Ok(None),
            text => Value::String(text),
        },
        FieldType::Number => match value {
            CellValue::Integer(_) | CellValue::Float(_) => value.to_json(),
            CellValue::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(None);
                }
                if let Ok(int) = text.parse::<i64>() {
                    Value::from(int)
                } else {
                    text.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .ok_or_else(|| type_mismatch(name, field_type, value))?
                }
            }
            _ => return Err(type_mismatch(name, field_type, value)),
        },
        FieldType::Checkbox => match value.as_bool() {
            Some(true) => Value::Bool(true),
            Some(false) => return Ok(None),
            None => return Err(type_mismatch(name, field_type, value)),
        },
        FieldType::DateTime => value
            .as_timestamp()
            .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)))
            .ok_or_else(|| type_mismatch(name, field_type, value))?,
    };
    if encoded.is_null() {
        return Err(type_mismatch(name, field_type, value));
    }
    Ok(Some(encoded))
}

/// Materializes a stored cell with its column type.
pub(crate) fn decode_cell(field_type: Option<FieldType>, value: &Value) -> CellValue {
    let cell = CellValue::from_json(value);
    match field_type {
        Some(FieldType::DateTime) => cell.as_timestamp().map(CellValue::Timestamp).unwrap_or(cell),
        Some(FieldType::Checkbox) => CellValue::Bool(cell.is_truthy()),
        _ => cell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn field_types_round_trip_through_text() {
        assert_eq!(field_type_to_db(FieldType::DateTime).unwrap(), "date_time");
        assert_eq!(field_type_from_db("checkbox").unwrap(), FieldType::Checkbox);
        assert!(field_type_from_db("formula").is_err());
    }

    #[test]
    fn numbers_accept_numeric_text_only() {
        assert_eq!(
            encode_cell("Units", FieldType::Number, &CellValue::from("12")).unwrap(),
            Some(Value::from(12))
        );
        assert!(encode_cell("Units", FieldType::Number, &CellValue::from("twelve")).is_err());
        assert!(encode_cell("Units", FieldType::Number, &CellValue::Bool(true)).is_err());
    }

    #[test]
    fn text_fields_stringify_scalars() {
        assert_eq!(
            encode_cell("Zip", FieldType::Text, &CellValue::Integer(60601)).unwrap(),
            Some(Value::from("60601"))
        );
    }

    #[test]
    fn unchecked_checkbox_and_null_clear() {
        assert_eq!(
            encode_cell("Fire Alarm", FieldType::Checkbox, &CellValue::Bool(false)).unwrap(),
            None
        );
        assert_eq!(
            encode_cell("City", FieldType::Text, &CellValue::Null).unwrap(),
            None
        );
    }

    #[test]
    fn date_times_are_typed_on_read() {
        let ts = Utc.with_ymd_and_hms(2025, 9, 24, 12, 0, 0).unwrap();
        let stored = encode_cell("DB Synced At", FieldType::DateTime, &CellValue::Timestamp(ts))
            .unwrap()
            .unwrap();
        assert_eq!(stored, Value::from("2025-09-24T12:00:00.000Z"));
        assert_eq!(
            decode_cell(Some(FieldType::DateTime), &stored),
            CellValue::Timestamp(ts)
        );
        assert_eq!(
            decode_cell(None, &stored),
            CellValue::from("2025-09-24T12:00:00.000Z")
        );
    }
}
