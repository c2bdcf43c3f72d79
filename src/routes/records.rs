use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::capture::config::CaptureConfig;
use crate::capture::types::{CaptureStage, FeatureRecord};
use crate::constants::{DEFAULT_RECORD_LIMIT, MAX_RECORD_LIMIT};
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::StoredRecordHandle;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/:handle", get(get_record))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListRecordsQuery {
    participant_id: Option<String>,
    stage: Option<CaptureStage>,
    limit: Option<usize>,
}

impl ListRecordsQuery {
    fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_RECORD_LIMIT)
            .clamp(1, MAX_RECORD_LIMIT)
    }
}

async fn list_records(
    Query(q): Query<ListRecordsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let participant_id = q
        .participant_id
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("MISSING_PARTICIPANT", "participantId is required"))?;

    let records = state
        .store()
        .list_feature_records(participant_id, q.stage, q.limit())?;
    Ok(ok(records))
}

fn validate_record(record: &FeatureRecord, capture: &CaptureConfig) -> Result<(), AppError> {
    if record.participant_id().trim().is_empty() {
        return Err(AppError::bad_request(
            "MISSING_PARTICIPANT",
            "participantId is required",
        ));
    }
    let text = record.self_report().trim();
    if text.is_empty() {
        return Err(AppError::bad_request(
            "EMPTY_SELF_REPORT",
            "selfReport must not be blank",
        ));
    }
    let max = capture.session.max_self_report_chars;
    if text.chars().count() > max {
        return Err(AppError::bad_request(
            "SELF_REPORT_TOO_LONG",
            &format!("selfReport exceeds {max} characters"),
        ));
    }
    record
        .check_bounds(&capture.complexion)
        .map_err(|e| AppError::bad_request("VALIDATION_ERROR", &e.to_string()))
}

/// 存储失败时仍返回 201，`handle` 为 null 并附带 `persistenceError`
async fn create_record(
    State(state): State<AppState>,
    JsonBody(record): JsonBody<FeatureRecord>,
) -> Result<impl IntoResponse, AppError> {
    validate_record(&record, state.capture_config())?;
    let outcome = state.checkin().persist(record);
    Ok(created(outcome))
}

async fn get_record(
    Path(handle): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let handle = StoredRecordHandle::parse(&handle)?;
    let stored = state
        .store()
        .get_feature_record(&handle)?
        .ok_or_else(|| AppError::not_found("RECORD_NOT_FOUND", &format!("record {handle} not found")))?;
    Ok(ok(stored))
}
