use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/database", get(database_health))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "reportBackend": state.checkin().report_backend(),
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// 迁移版本可读即视为就绪
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().current_schema_version() {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness probe failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

pub async fn database_health(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    let version = state.store().current_schema_version();
    let latency_us = start.elapsed().as_micros() as u64;

    Json(serde_json::json!({
        "healthy": version.is_ok(),
        "latencyUs": latency_us,
        "schemaVersion": version.ok(),
    }))
}
