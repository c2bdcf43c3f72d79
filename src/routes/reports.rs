use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;

use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::StoredRecordHandle;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_report))
        .route("/:participant_id/latest", get(latest_report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateReportRequest {
    participant_id: String,
    before: StoredRecordHandle,
    after: Option<StoredRecordHandle>,
}

async fn create_report(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    let participant_id = req.participant_id.trim();
    if participant_id.is_empty() {
        return Err(AppError::bad_request(
            "MISSING_PARTICIPANT",
            "participantId is required",
        ));
    }
    let before = StoredRecordHandle::parse(req.before.as_str())?;
    let after = req
        .after
        .as_ref()
        .map(|h| StoredRecordHandle::parse(h.as_str()))
        .transpose()?;

    let report = state
        .checkin()
        .compare(participant_id, &before, after.as_ref())
        .await?;
    Ok(created(report))
}

async fn latest_report(
    Path(participant_id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .checkin()
        .latest_report(&participant_id)?
        .ok_or_else(|| AppError::not_found("REPORT_NOT_FOUND", "no report for this participant"))?;
    Ok(ok(report))
}
