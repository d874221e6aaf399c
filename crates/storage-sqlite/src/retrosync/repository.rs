//! Repository for the retrosync control record.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::debug;

use sheetsync_core::errors::{Error, Result};
use sheetsync_core::sync::{Watermark, WatermarkStoreTrait};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_control;
use crate::sheet::new_record_id;

use super::model::SyncControlDB;

fn first_control(conn: &mut SqliteConnection) -> Result<Option<SyncControlDB>> {
    Ok(sync_control::table
        .order(sync_control::id.asc())
        .first::<SyncControlDB>(conn)
        .optional()
        .map_err(StorageError::from)?)
}

pub struct SyncControlRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncControlRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl WatermarkStoreTrait for SyncControlRepository {
    fn load_watermark(&self) -> Result<Watermark> {
        let mut conn = get_connection(&self.pool)?;
        match first_control(&mut conn)? {
            Some(row) => row.into_watermark(),
            None => Ok(Watermark::default()),
        }
    }

    /// Writes the cursor only. The lock column keeps whatever is stored, so a
    /// lock set while a run was in flight survives the run's cursor write.
    async fn save_watermark(&self, watermark: Watermark) -> Result<Watermark> {
        self.writer
            .exec(move |conn| {
                let target = match &watermark.record_id {
                    Some(id) => Some(id.clone()),
                    None => first_control(conn)?.map(|row| row.id),
                };

                let Some(id) = target else {
                    let row = SyncControlDB::from_watermark(new_record_id(), &watermark);
                    diesel::insert_into(sync_control::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    debug!("Created retrosync control record {}", row.id);
                    return row.into_watermark();
                };

                let changes = SyncControlDB::from_watermark(id.clone(), &watermark);
                let affected = diesel::update(sync_control::table.find(&id))
                    .set((
                        sync_control::last_cursor.eq(&changes.last_cursor),
                        sync_control::updated_at.eq(&changes.updated_at),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected == 0 {
                    return Err(Error::store(format!("Control record not found: {}", id)));
                }

                sync_control::table
                    .find(&id)
                    .first::<SyncControlDB>(conn)
                    .map_err(StorageError::from)?
                    .into_watermark()
            })
            .await
    }

    async fn set_sync_lock(&self, locked: bool) -> Result<Watermark> {
        self.writer
            .exec(move |conn| {
                let mut watermark = match first_control(conn)? {
                    Some(row) => row.into_watermark()?,
                    None => Watermark::default(),
                };
                watermark.sync_lock = Some(locked);

                let id = watermark.record_id.clone().unwrap_or_else(new_record_id);
                let row = SyncControlDB::from_watermark(id, &watermark);
                diesel::insert_into(sync_control::table)
                    .values(&row)
                    .on_conflict(sync_control::id)
                    .do_update()
                    .set((
                        sync_control::sync_lock.eq(row.sync_lock),
                        sync_control::updated_at.eq(&row.updated_at),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                row.into_watermark()
            })
            .await
    }
}
