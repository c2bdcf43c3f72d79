use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::response::AppError;

/// `axum::Json<T>` whose rejections render as `AppError` bodies.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(rejection_to_app_error(rejection)),
        }
    }
}

fn rejection_to_app_error(rejection: JsonRejection) -> AppError {
    match rejection {
        // 字段缺失或类型错误：把 serde 的定位信息返回给调用方
        JsonRejection::JsonDataError(e) => {
            tracing::warn!(error = %e, "JSON data deserialization failed");
            AppError::bad_request("INVALID_REQUEST_BODY", &e.body_text())
        }
        JsonRejection::JsonSyntaxError(e) => {
            tracing::warn!(error = %e, "JSON syntax parsing failed");
            AppError::bad_request("INVALID_REQUEST_BODY", "请求体不是合法 JSON")
        }
        JsonRejection::MissingJsonContentType(e) => {
            tracing::warn!(error = %e, "Missing or invalid JSON Content-Type");
            AppError::bad_request("INVALID_CONTENT_TYPE", "需要 application/json 请求体")
        }
        other => {
            tracing::warn!(error = %other, "Unexpected JSON body rejection");
            AppError::bad_request("INVALID_REQUEST_BODY", "请求体格式无效")
        }
    }
}
