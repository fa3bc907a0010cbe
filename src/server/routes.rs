//! # 路由配置
//!
//! 定义所有API路由和路由组织

use axum::Router;
use axum::routing::{get, post};

use super::handlers;
use super::server::AppState;

/// 创建所有路由（挂载在 `/api` 下）
///
/// 路径不存在返回 404，方法不匹配返回 405，两者都是 JSON 错误体。
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查路由
        .route(
            "/health",
            get(handlers::health::health_check).fallback(handlers::method_not_allowed),
        )
        // AI 生成路由
        .nest("/ai", ai_routes())
        .fallback(handlers::api_not_found)
        .with_state(state)
}

/// AI 生成路由
fn ai_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/test",
            get(handlers::ai::test_connection).fallback(handlers::method_not_allowed),
        )
        .route(
            "/generate",
            post(handlers::ai::generate).fallback(handlers::method_not_allowed),
        )
}
