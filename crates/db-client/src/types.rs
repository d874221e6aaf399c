//! Wire types of the building database API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sheetsync_core::sync::{CellValue, ChangeBatch, ChangeRow, FieldAssignment};

use crate::error::{DbClientError, Result};

/// Raw body of `GET /airtable/buildings/changes`.
///
/// The row lists are kept untyped so that malformed entries can be dropped
/// instead of failing the whole window.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangesResponse {
    #[serde(default)]
    pub now: Option<String>,
    #[serde(default)]
    pub upserts: Value,
    #[serde(default)]
    pub deletes: Value,
}

impl ChangesResponse {
    pub fn into_batch(self) -> Result<ChangeBatch> {
        let raw_now = self
            .now
            .ok_or_else(|| DbClientError::invalid_response("change feed response has no `now`"))?;
        let now = DateTime::parse_from_rfc3339(raw_now.trim())
            .map(|value| value.with_timezone(&Utc))
            .map_err(|err| {
                DbClientError::invalid_response(format!("invalid `now` '{}': {}", raw_now, err))
            })?;

        Ok(ChangeBatch {
            now,
            upserts: rows(&self.upserts),
            deletes: rows(&self.deletes),
        })
    }
}

fn rows(value: &Value) -> Vec<ChangeRow> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|object| {
            ChangeRow(
                object
                    .iter()
                    .map(|(key, value)| (key.clone(), CellValue::from_json(value)))
                    .collect(),
            )
        })
        .collect()
}

/// Body of the ingest and update endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct FieldsRequest<'a> {
    pub fields: &'a FieldAssignment,
}

/// Body of the delete and restore endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BuildingIdRequest<'a> {
    pub building_id: &'a CellValue,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestResponseBody {
    #[serde(default)]
    pub building_id: Option<Value>,
    #[serde(default)]
    pub address_normalized: Option<String>,
}

impl IngestResponseBody {
    /// Building id as an integer; numeric strings are accepted.
    pub fn building_id(&self) -> Option<i64> {
        match self.building_id.as_ref()? {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|value| value as i64)),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Error body shapes returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorResponse {
    pub fn describe(&self) -> Option<String> {
        match (&self.detail, &self.message) {
            (Some(Value::String(detail)), _) => Some(detail.clone()),
            (Some(detail), _) if !detail.is_null() => Some(detail.to_string()),
            (_, Some(message)) => Some(message.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<ChangeBatch> {
        serde_json::from_value::<ChangesResponse>(value)?.into_batch()
    }

    #[test]
    fn keeps_absent_and_null_apart() {
        let batch = parse(json!({
            "now": "2025-09-24T12:00:00Z",
            "upserts": [{ "building_id": 100, "city": null }],
            "deletes": [{ "building_id": "101" }]
        }))
        .unwrap();

        let row = &batch.upserts[0];
        assert_eq!(row.get("city"), Some(&CellValue::Null));
        assert_eq!(row.get("county"), None);
        assert_eq!(row.natural_key().as_deref(), Some("100"));
        assert_eq!(batch.deletes[0].natural_key().as_deref(), Some("101"));
    }

    #[test]
    fn malformed_row_lists_are_empty() {
        let batch = parse(json!({
            "now": "2025-09-24T12:00:00.250+02:00",
            "upserts": null,
            "deletes": [1, "x", { "building_id": 5 }]
        }))
        .unwrap();

        assert!(batch.upserts.is_empty());
        assert_eq!(batch.deletes.len(), 1);
        assert_eq!(batch.now.to_rfc3339(), "2025-09-24T10:00:00.250+00:00");
    }

    #[test]
    fn missing_or_bad_now_is_rejected() {
        assert!(matches!(
            parse(json!({ "upserts": [] })),
            Err(DbClientError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse(json!({ "now": "yesterday" })),
            Err(DbClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn ingest_body_accepts_numeric_strings() {
        let body: IngestResponseBody =
            serde_json::from_value(json!({ "building_id": "42" })).unwrap();
        assert_eq!(body.building_id(), Some(42));
        assert_eq!(body.address_normalized, None);
    }

    #[test]
    fn error_body_prefers_detail() {
        let body: ApiErrorResponse =
            serde_json::from_value(json!({ "detail": "Building not found" })).unwrap();
        assert_eq!(body.describe().as_deref(), Some("Building not found"));

        let body: ApiErrorResponse =
            serde_json::from_value(json!({ "detail": [{ "loc": ["body"] }] })).unwrap();
        assert!(body.describe().unwrap().contains("loc"));
    }
}
