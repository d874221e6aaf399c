//! Retrosync: pulls database changes since the stored cursor into the sheet.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::errors::{Error, Result};

use super::batch_applier::{BatchApplier, BatchApplyError, OperationKind};
use super::change_classifier::ChangeClassifier;
use super::field_mapper::FieldMapper;
use super::key_index::KeyIndex;
use super::retrosync_model::{SyncReport, Watermark, NATURAL_KEY_FIELD, SHEET_MAX_BATCH_SIZE};
use super::sync_traits::{ChangeFeedTrait, SheetStoreTrait, WatermarkStoreTrait};
use super::watermark::{WatermarkController, WatermarkGate};

pub const SKIPPED_SYNC_LOCK: &str = "Sync Lock checked";
pub const SKIPPED_RUN_IN_PROGRESS: &str = "Sync already running";
pub const FETCH_FAILED_MESSAGE: &str = "changes endpoint failed";

/// What to do when two sheet rows share a natural key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKeyPolicy {
    /// Index the later row and report the key.
    #[default]
    LastWins,
    /// Abort the run before applying anything.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrosyncConfig {
    pub batch_size: usize,
    pub duplicate_keys: DuplicateKeyPolicy,
}

impl Default for RetrosyncConfig {
    fn default() -> Self {
        Self {
            batch_size: SHEET_MAX_BATCH_SIZE,
            duplicate_keys: DuplicateKeyPolicy::LastWins,
        }
    }
}

impl RetrosyncConfig {
    pub fn new(batch_size: usize, duplicate_keys: DuplicateKeyPolicy) -> Result<Self> {
        if batch_size == 0 || batch_size > SHEET_MAX_BATCH_SIZE {
            return Err(Error::validation(format!(
                "batch size must be between 1 and {}, got {}",
                SHEET_MAX_BATCH_SIZE, batch_size
            )));
        }
        Ok(Self {
            batch_size,
            duplicate_keys,
        })
    }
}

/// Result of reconciling one change window.
///
/// `watermark` is the advanced state to persist, present only when every
/// operation was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrosyncOutcome {
    pub report: SyncReport,
    pub watermark: Option<Watermark>,
}

impl RetrosyncOutcome {
    fn finished(report: SyncReport) -> Self {
        Self {
            report,
            watermark: None,
        }
    }
}

pub struct RetrosyncService {
    sheet: Arc<dyn SheetStoreTrait>,
    feed: Arc<dyn ChangeFeedTrait>,
    watermarks: WatermarkController,
    mapper: FieldMapper,
    config: RetrosyncConfig,
    run_guard: Mutex<()>,
}

impl RetrosyncService {
    pub fn new(
        sheet: Arc<dyn SheetStoreTrait>,
        feed: Arc<dyn ChangeFeedTrait>,
        watermarks: Arc<dyn WatermarkStoreTrait>,
        config: RetrosyncConfig,
    ) -> Self {
        Self {
            sheet,
            feed,
            watermarks: WatermarkController::new(watermarks),
            mapper: FieldMapper::buildings(),
            config,
            run_guard: Mutex::new(()),
        }
    }

    pub fn with_mapper(mut self, mapper: FieldMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn config(&self) -> &RetrosyncConfig {
        &self.config
    }

    pub fn watermarks(&self) -> &WatermarkController {
        &self.watermarks
    }

    /// Runs one retrosync: load the control record, reconcile, persist the
    /// advanced cursor. Never fails; every outcome is described by the report.
    pub async fn run(&self) -> SyncReport {
        let Ok(_guard) = self.run_guard.try_lock() else {
            debug!("Retrosync trigger ignored: a run is already in progress");
            return SyncReport::skipped(SKIPPED_RUN_IN_PROGRESS);
        };

        let watermark = match self.watermarks.load() {
            Ok(value) => value,
            Err(err) => {
                warn!("Retrosync could not read the control record: {}", err);
                return SyncReport {
                    ok: false,
                    error: Some(format!("cursor read failed: {}", err)),
                    ..Default::default()
                };
            }
        };

        let RetrosyncOutcome {
            mut report,
            watermark: advanced,
        } = self.reconcile(watermark).await;

        if let Some(advanced) = advanced {
            match self.watermarks.persist(advanced).await {
                Ok(saved) => report.cursor = saved.last_cursor,
                Err(err) => {
                    warn!("Retrosync applied changes but could not advance the cursor: {}", err);
                    report.ok = false;
                    report.error = Some(format!("cursor write failed: {}", err));
                }
            }
        }

        if report.ok {
            info!(
                "Retrosync finished: {} updated, {} created, {} deleted",
                report.updates_applied, report.creates_applied, report.deletes_applied
            );
        } else {
            warn!(
                "Retrosync failed after {} operations: {}",
                report.total_applied(),
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
        report
    }

    /// Reconciles the change window after `watermark` into the sheet.
    ///
    /// The returned watermark is not persisted here.
    pub async fn reconcile(&self, watermark: Watermark) -> RetrosyncOutcome {
        let (watermark, since) = match WatermarkGate::evaluate(watermark) {
            WatermarkGate::Locked => {
                info!("Retrosync skipped: sync lock is set");
                return RetrosyncOutcome::finished(SyncReport::skipped(SKIPPED_SYNC_LOCK));
            }
            WatermarkGate::Open { watermark, since } => (watermark, since),
        };

        let batch = match self.feed.fetch_changes(since).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!("Change feed fetch since {} failed: {}", since, err);
                let message = match err.status_code() {
                    Some(_) => FETCH_FAILED_MESSAGE.to_string(),
                    None => err.to_string(),
                };
                return RetrosyncOutcome::finished(SyncReport::fetch_failed(
                    err.status_code(),
                    message,
                ));
            }
        };
        debug!(
            "Fetched {} upserts and {} deletes since {} (feed now {})",
            batch.upserts.len(),
            batch.deletes.len(),
            since,
            batch.now
        );

        let index = match self.build_index() {
            Ok(index) => index,
            Err(err) => {
                return RetrosyncOutcome::finished(SyncReport {
                    ok: false,
                    error: Some(err.to_string()),
                    ..Default::default()
                })
            }
        };
        let known_targets = match self.sheet.field_names() {
            Ok(names) => names,
            Err(err) => {
                return RetrosyncOutcome::finished(SyncReport {
                    ok: false,
                    error: Some(err.to_string()),
                    ..Default::default()
                })
            }
        };

        let classification =
            ChangeClassifier::new(&self.mapper, &index, &known_targets, Utc::now())
                .classify(&batch.upserts, &batch.deletes);
        for target in &classification.unknown_targets {
            warn!("Sheet has no column '{}'; mapped values were skipped", target);
        }

        let mut report = SyncReport::default()
            .with_skipped_fields(&classification.unknown_targets);
        report.duplicate_keys = index.duplicate_keys().to_vec();

        let applier = BatchApplier::new(self.config.batch_size.min(self.sheet.max_batch_size()));
        let sheet = &self.sheet;

        let result = async {
            report.updates_applied = applier
                .apply(OperationKind::Update, classification.to_update, move |chunk| {
                    sheet.update_records(chunk)
                })
                .await?;
            report.creates_applied = applier
                .apply(OperationKind::Create, classification.to_create, move |chunk| async move {
                    sheet.create_records(chunk).await.map(|_| ())
                })
                .await?;
            report.deletes_applied = applier
                .apply(OperationKind::Delete, classification.to_delete, move |chunk| {
                    sheet.update_records(chunk)
                })
                .await?;
            Ok::<(), BatchApplyError>(())
        }
        .await;

        if let Err(err) = result {
            match err.kind {
                OperationKind::Update => report.updates_applied = err.applied,
                OperationKind::Create => report.creates_applied = err.applied,
                OperationKind::Delete => report.deletes_applied = err.applied,
            }
            report.ok = false;
            report.error = Some(err.to_string());
            return RetrosyncOutcome::finished(report);
        }

        report.ok = true;
        RetrosyncOutcome {
            report,
            watermark: Some(watermark.advanced_to(batch.now)),
        }
    }

    fn build_index(&self) -> Result<KeyIndex> {
        let records = self.sheet.select_records(Some(&[NATURAL_KEY_FIELD]))?;
        let index = KeyIndex::build(records);
        if index.orphan_count() > 0 {
            debug!("{} sheet rows have no building_id", index.orphan_count());
        }
        if self.config.duplicate_keys == DuplicateKeyPolicy::Reject
            && !index.duplicate_keys().is_empty()
        {
            return Err(Error::Integrity(format!(
                "duplicate building_id values in sheet: {}",
                index.duplicate_keys().join(", ")
            )));
        }
        Ok(index)
    }
}
