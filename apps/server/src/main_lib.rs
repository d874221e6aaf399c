use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use sheetsync_core::sync::{
    default_building_fields, RecordPushService, RetrosyncService, SyncReport,
};
use sheetsync_db_client::BuildingDbClient;
use sheetsync_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, SheetRepository, SyncControlRepository,
};

use crate::config::ServerConfig;

/// What started a retrosync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RetrosyncTrigger {
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrosyncRun {
    pub trigger: RetrosyncTrigger,
    pub finished_at: DateTime<Utc>,
    pub report: SyncReport,
}

/// Background loop handle and the outcome of the last run.
#[derive(Default)]
pub struct RetrosyncRuntimeState {
    pub last_run: RwLock<Option<RetrosyncRun>>,
    pub background_task: Mutex<Option<JoinHandle<()>>>,
}

pub struct AppState {
    pub config: ServerConfig,
    pub sheet: Arc<SheetRepository>,
    pub watermarks: Arc<SyncControlRepository>,
    pub retrosync: Arc<RetrosyncService>,
    pub record_push: Arc<RecordPushService>,
    pub retrosync_runtime: RetrosyncRuntimeState,
}

impl AppState {
    /// Runs one retrosync and remembers its report for the status endpoint.
    pub async fn run_retrosync(&self, trigger: RetrosyncTrigger) -> SyncReport {
        let report = self.retrosync.run().await;
        let run = RetrosyncRun {
            trigger,
            finished_at: Utc::now(),
            report: report.clone(),
        };
        *self.retrosync_runtime.last_run.write().await = Some(run);
        report
    }

    pub async fn background_running(&self) -> bool {
        self.retrosync_runtime
            .background_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

pub async fn build_state(config: ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let db_path = init(&config.data_dir).context("Failed to prepare data directory")?;
    run_migrations(&db_path).context("Failed to run migrations")?;
    let pool = create_pool(&db_path).context("Failed to open database pool")?;
    let writer = spawn_writer(pool.as_ref().clone());
    info!("Database ready at {}", db_path);

    let sheet = Arc::new(SheetRepository::new(pool.clone(), writer.clone()));
    let added = sheet
        .ensure_fields(default_building_fields())
        .await
        .context("Failed to provision sheet columns")?;
    if added > 0 {
        info!("Provisioned {} sheet columns", added);
    }
    let watermarks = Arc::new(SyncControlRepository::new(pool, writer));

    let client = Arc::new(
        BuildingDbClient::new(&config.db_api_url, config.db_api_token.clone())
            .context("Failed to build database API client")?,
    );

    let retrosync = Arc::new(RetrosyncService::new(
        sheet.clone(),
        client.clone(),
        watermarks.clone(),
        config.retrosync,
    ));
    let record_push = Arc::new(RecordPushService::new(sheet.clone(), client));

    Ok(Arc::new(AppState {
        config,
        sheet,
        watermarks,
        retrosync,
        record_push,
        retrosync_runtime: RetrosyncRuntimeState::default(),
    }))
}
