//! Database model for the retrosync control record.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use sheetsync_core::errors::{DatabaseError, Error, Result};
use sheetsync_core::sync::Watermark;

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
#[diesel(table_name = crate::schema::sync_control)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncControlDB {
    pub id: String,
    pub last_cursor: Option<String>,
    pub sync_lock: Option<bool>,
    pub updated_at: String,
}

impl SyncControlDB {
    pub fn from_watermark(id: String, watermark: &Watermark) -> Self {
        Self {
            id,
            last_cursor: watermark
                .last_cursor
                .map(|cursor| cursor.to_rfc3339_opts(SecondsFormat::Millis, true)),
            sync_lock: watermark.sync_lock,
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn into_watermark(self) -> Result<Watermark> {
        let last_cursor = self
            .last_cursor
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|cursor| cursor.with_timezone(&Utc))
                    .map_err(|e| {
                        Error::Database(DatabaseError::Internal(format!(
                            "Invalid stored cursor '{}': {}",
                            raw, e
                        )))
                    })
            })
            .transpose()?;

        Ok(Watermark {
            record_id: Some(self.id),
            last_cursor,
            sync_lock: self.sync_lock,
        })
    }
}
