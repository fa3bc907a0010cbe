//! # API 响应结构
//!
//! 所有 `/api` 出口统一为 JSON：成功时直接返回数据，失败时返回 `{error, code, detail?}`。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// # 标准错误响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// # API响应枚举
///
/// 统一所有API出口，方便转换为 `axum::response::Response`
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    Error(StatusCode, String, String),
    Gateway(GatewayError),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Success(data) => (StatusCode::OK, Json(data)).into_response(),
            Self::Error(status, code, message) => (
                status,
                Json(ErrorResponse {
                    error: message,
                    code,
                    detail: None,
                }),
            )
                .into_response(),
            Self::Gateway(error) => (
                error.status_code(),
                Json(ErrorResponse {
                    error: error.to_string(),
                    code: error.code().to_string(),
                    detail: error.detail().map(ToString::to_string),
                }),
            )
                .into_response(),
        }
    }
}

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// # 便捷函数：HTTP错误响应
pub fn error(status: StatusCode, code: &str, message: &str) -> Response {
    ApiResponse::<()>::Error(status, code.to_string(), message.to_string()).into_response()
}

/// # 便捷函数：网关错误响应
pub fn gateway_error(error: GatewayError) -> Response {
    ApiResponse::<()>::Gateway(error).into_response()
}
