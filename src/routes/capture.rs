use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::response::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/config", get(capture_config))
}

/// 采集端据此设置倒计时、采样参数与随机种子
async fn capture_config(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.capture_config().clone())
}
