//! 健康检查处理器

use axum::extract::State;
use axum::response::IntoResponse;

use crate::server::{response, server::AppState};

/// `GET /api/health`，只检查本地配置，总是返回 200
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let request_id = uuid::Uuid::new_v4().to_string();
    response::success(state.health.check_health(&request_id))
}
