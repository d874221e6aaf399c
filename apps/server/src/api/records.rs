use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, info};

use sheetsync_core::sync::{
    FieldAssignment, IngestOutcome, LocalRecord, PushUpdateOutcome, SheetStoreTrait,
    SoftDeleteOutcome,
};

use crate::error::{ApiError, ApiResult};
use crate::main_lib::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordFieldsRequest {
    #[serde(default)]
    pub fields: FieldAssignment,
}

fn load_record(state: &AppState, id: &str) -> ApiResult<LocalRecord> {
    state
        .sheet
        .get_record(id)?
        .ok_or_else(|| ApiError::NotFound(format!("Record {} not found", id)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Sheet records
// ─────────────────────────────────────────────────────────────────────────────

async fn list_records(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<LocalRecord>>> {
    Ok(Json(state.sheet.select_records(None)?))
}

async fn create_record(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RecordFieldsRequest>,
) -> ApiResult<Json<LocalRecord>> {
    let id = state.sheet.create_record(body.fields).await?;
    debug!("Created sheet record {}", id);
    Ok(Json(load_record(&state, &id)?))
}

async fn update_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RecordFieldsRequest>,
) -> ApiResult<Json<LocalRecord>> {
    load_record(&state, &id)?;
    state.sheet.update_record(&id, body.fields).await?;
    Ok(Json(load_record(&state, &id)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Pushes to the building database
// ─────────────────────────────────────────────────────────────────────────────

async fn toggle_soft_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SoftDeleteOutcome>> {
    let outcome = state.record_push.toggle_soft_delete(&id).await?;
    info!(
        "[Push] Soft delete toggle for {}: {:?} ok={}",
        id, outcome.action, outcome.ok
    );
    Ok(Json(outcome))
}

async fn ingest_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<IngestOutcome>> {
    let outcome = state.record_push.ingest_record(&id).await?;
    info!(
        "[Push] Ingest of {}: ok={} building_id={:?}",
        id, outcome.ok, outcome.building_id
    );
    Ok(Json(outcome))
}

async fn push_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PushUpdateOutcome>> {
    let outcome = state.record_push.push_update(&id).await?;
    info!("[Push] Update of {}: ok={}", id, outcome.ok);
    Ok(Json(outcome))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/records", get(list_records).post(create_record))
        .route("/records/:id", patch(update_record))
        .route("/records/:id/soft-delete", post(toggle_soft_delete))
        .route("/records/:id/ingest", post(ingest_record))
        .route("/records/:id/push-update", post(push_update))
}
