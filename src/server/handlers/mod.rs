//! # 请求处理器

pub mod ai;
pub mod health;

use axum::http::StatusCode;
use axum::response::Response;

use crate::server::response;

/// `/api` 下未匹配的路径，保证返回 JSON 而不是前端页面
pub async fn api_not_found() -> Response {
    response::error(
        StatusCode::NOT_FOUND,
        "API_NOT_FOUND",
        "API endpoint not found",
    )
}

/// 路径存在但方法不匹配
pub async fn method_not_allowed() -> Response {
    response::error(
        StatusCode::METHOD_NOT_ALLOWED,
        "METHOD_NOT_ALLOWED",
        "Method not allowed for this API endpoint",
    )
}
