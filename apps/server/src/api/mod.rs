use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::main_lib::AppState;

mod records;
mod retrosync;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .merge(retrosync::router())
        .merge(records::router());

    Router::new().nest("/api/v1", api).with_state(state)
}
