use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use sheetsync_core::sync::{SyncReport, Watermark, WatermarkStoreTrait};

use crate::error::ApiResult;
use crate::main_lib::{AppState, RetrosyncRun, RetrosyncTrigger};

#[derive(Debug, Deserialize)]
pub struct SetLockRequest {
    pub locked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrosyncStatusResponse {
    pub last_run: Option<RetrosyncRun>,
    pub watermark: Watermark,
    pub background_running: bool,
    pub interval_secs: u64,
}

async fn run_retrosync(State(state): State<Arc<AppState>>) -> Json<SyncReport> {
    info!("[Retrosync] Manual run requested");
    Json(state.run_retrosync(RetrosyncTrigger::Manual).await)
}

async fn get_retrosync_status(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<RetrosyncStatusResponse>> {
    let watermark = state.watermarks.load_watermark()?;
    let last_run = state.retrosync_runtime.last_run.read().await.clone();

    Ok(Json(RetrosyncStatusResponse {
        last_run,
        watermark,
        background_running: state.background_running().await,
        interval_secs: state.config.retrosync_interval_secs,
    }))
}

async fn set_retrosync_lock(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetLockRequest>,
) -> ApiResult<Json<Watermark>> {
    info!("[Retrosync] Setting sync lock to {}", body.locked);
    let watermark = state.retrosync.watermarks().set_lock(body.locked).await?;
    Ok(Json(watermark))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/retrosync", post(run_retrosync))
        .route("/retrosync/status", get(get_retrosync_status))
        .route("/retrosync/lock", put(set_retrosync_lock))
}
