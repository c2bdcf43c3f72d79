use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::checkin::CheckInError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub is_operational: bool,
}

impl AppError {
    fn operational(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            is_operational: true,
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::NOT_FOUND, code, message)
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            is_operational: false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "服务器内部错误".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
            }),
        )
            .into_response()
    }
}

// StoreError 映射：
// - Validation -> 400（用户输入问题，可暴露消息）
// - NotFound -> 404
// - 其他 -> 500（is_operational=false，消息被替换）
impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::Validation(msg) => AppError::bad_request("VALIDATION_ERROR", msg),
            StoreError::NotFound { .. } => AppError::not_found("NOT_FOUND", &value.to_string()),
            _ => AppError::internal(&value.to_string()),
        }
    }
}

impl From<CheckInError> for AppError {
    fn from(value: CheckInError) -> Self {
        match value {
            CheckInError::RecordNotFound(_) => {
                AppError::not_found("RECORD_NOT_FOUND", &value.to_string())
            }
            CheckInError::ParticipantMismatch { .. } => {
                AppError::bad_request("PARTICIPANT_MISMATCH", &value.to_string())
            }
            CheckInError::StageMismatch { .. } => {
                AppError::bad_request("STAGE_MISMATCH", &value.to_string())
            }
            CheckInError::Store(e) => e.into(),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}
