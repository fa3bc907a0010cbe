//! AI 生成相关处理器

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::providers::GenerationRequest;
use crate::server::{response, server::AppState};
use crate::{
    lerror, linfo,
    logging::{LogComponent, LogStage},
    lwarn,
};

/// 连接测试响应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConnectionResponse {
    pub message: String,
}

/// `GET /api/ai/test`：用单个密钥做一次真实调用
pub async fn test_connection(State(state): State<AppState>) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    linfo!(
        request_id,
        LogStage::RequestStart,
        LogComponent::Handler,
        "test_connection",
        "Connection test requested"
    );

    match state.gateway.test_connection(&request_id).await {
        Ok(message) => response::success(TestConnectionResponse { message }),
        Err(GatewayError::NoKeyConfigured) => response::error(
            StatusCode::UNAUTHORIZED,
            GatewayError::NoKeyConfigured.code(),
            "No API key found",
        ),
        Err(e) => {
            lerror!(
                request_id,
                LogStage::ResponseFailure,
                LogComponent::Handler,
                "test_connection_failed",
                "Connection test failed",
                code = e.code(),
                error = %e
            );
            response::gateway_error(e)
        }
    }
}

/// `POST /api/ai/generate`：带故障转移的内容生成
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerationRequest>, JsonRejection>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            lwarn!(
                request_id,
                LogStage::RequestStart,
                LogComponent::Handler,
                "invalid_body",
                "Rejected unparseable request body",
                error = %rejection.body_text()
            );
            return response::error(
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST_BODY",
                &rejection.body_text(),
            );
        }
    };

    if let Err(reason) = request.validate() {
        return response::error(StatusCode::BAD_REQUEST, "INVALID_REQUEST_BODY", &reason);
    }

    linfo!(
        request_id,
        LogStage::RequestStart,
        LogComponent::Handler,
        "generate",
        "Generation requested",
        model = request.model.as_deref().unwrap_or("default")
    );

    match state.gateway.generate(&request_id, &request).await {
        Ok(generated) => response::success(generated),
        Err(e) => {
            lerror!(
                request_id,
                LogStage::ResponseFailure,
                LogComponent::Handler,
                "generate_failed",
                "AI generation failed",
                code = e.code(),
                status = e.status_code().as_u16(),
                error = %e
            );
            response::gateway_error(e)
        }
    }
}
