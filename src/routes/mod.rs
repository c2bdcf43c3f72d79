pub mod capture;
pub mod health;
pub mod records;
pub mod reports;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router};

use crate::constants::MAX_BODY_SIZE;
use crate::response::ErrorBody;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/capture", capture::router())
        .nest("/records", records::router())
        .nest("/reports", reports::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            code: "NOT_FOUND".to_string(),
            message: "Not found".to_string(),
        }),
    )
}
