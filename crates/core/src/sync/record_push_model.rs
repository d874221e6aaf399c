//! Models for single-record pushes from the sheet to the building database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Successful response of a database write endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCallResult {
    pub status: u16,
    /// Parsed JSON body, or the raw text as a JSON string when it was not JSON.
    pub body: serde_json::Value,
}

/// Response of the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: u16,
    pub building_id: Option<i64>,
    pub address_normalized: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftDeleteAction {
    Delete,
    Restore,
    Noop,
}

/// Result of reconciling a record's delete checkbox with the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftDeleteOutcome {
    pub ok: bool,
    pub action: SoftDeleteAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SoftDeleteOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            action: SoftDeleteAction::Noop,
            status: None,
            error: Some(error.into()),
        }
    }

    pub fn noop() -> Self {
        Self {
            ok: true,
            action: SoftDeleteAction::Noop,
            status: None,
            error: None,
        }
    }
}

/// Result of sending a sheet record to the ingest endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub ok: bool,
    pub building_id: Option<i64>,
    pub address_normalized: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of pushing a record's fields to the update endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushUpdateOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
