//! # 网关 HTTP 客户端
//!
//! 封装 `/api/health`、`/api/ai/test`、`/api/ai/generate` 三个接口

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::error::ClientError;
use crate::health::HealthStatus;
use crate::logging::{LogComponent, LogStage};
use crate::providers::GenerationResponse;
use crate::{ldebug, lwarn};

/// 默认请求超时
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Deserialize)]
struct TestConnectionBody {
    message: String,
}

/// 网关客户端
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
}

impl GatewayClient {
    /// 创建客户端，`base_url` 为网关根地址（不含 `/api`）
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Unreachable(format!("Invalid gateway url {base_url}: {e}")))?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// 网关根地址
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Unreachable(format!("Invalid endpoint {path}: {e}")))
    }

    /// 查询健康状态
    ///
    /// 响应体无法解析为健康状态时返回 `MalformedBody`，由调用方决定是否重试。
    pub async fn fetch_health(&self, request_id: &str) -> Result<HealthStatus, ClientError> {
        let response = self.http.get(self.endpoint("/api/health")?).send().await?;
        let status = response.status();
        let body = response.text().await?;

        serde_json::from_str::<HealthStatus>(&body).map_err(|e| {
            lwarn!(
                request_id,
                LogStage::Reconcile,
                LogComponent::Client,
                "health_body_malformed",
                "Health response is not a valid status document",
                status = status.as_u16(),
                error = %e
            );
            ClientError::malformed(status.as_u16(), &body)
        })
    }

    /// 连接测试，成功时返回模型输出
    pub async fn test_connection(&self, request_id: &str) -> Result<String, ClientError> {
        let response = self.http.get(self.endpoint("/api/ai/test")?).send().await?;
        let (status, body) = read_body(response).await?;
        let value = parse_success_body(request_id, status, &body)?;
        let parsed: TestConnectionBody = serde_json::from_value(value)
            .map_err(|_| ClientError::malformed(status.as_u16(), &body))?;
        Ok(parsed.message)
    }

    /// 单次生成调用（不含重试）
    pub async fn generate(
        &self,
        request_id: &str,
        payload: &Value,
    ) -> Result<GenerationResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint("/api/ai/generate")?)
            .json(payload)
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        let value = parse_success_body(request_id, status, &body)?;

        if value.get("text").is_none() && value.get("candidates").is_some() {
            lwarn!(
                request_id,
                LogStage::Response,
                LogComponent::Client,
                "missing_text_field",
                "Response has candidates but no text property"
            );
        }

        serde_json::from_value::<GenerationResponse>(value)
            .map_err(|_| ClientError::malformed(status.as_u16(), &body))
    }
}

async fn read_body(response: reqwest::Response) -> Result<(StatusCode, String), ClientError> {
    let status = response.status();
    let body = response.text().await?;
    Ok((status, body))
}

/// 非 2xx 转换为分类后的错误，2xx 要求非空 JSON
fn parse_success_body(request_id: &str, status: StatusCode, body: &str) -> Result<Value, ClientError> {
    if !status.is_success() {
        let err = ClientError::from_error_body(status.as_u16(), body);
        ldebug!(
            request_id,
            LogStage::ResponseFailure,
            LogComponent::Client,
            "gateway_error",
            "Gateway returned an error response",
            status = status.as_u16(),
            error = %err
        );
        return Err(err);
    }
    if body.trim().is_empty() {
        return Err(ClientError::EmptyBody);
    }
    serde_json::from_str(body).map_err(|_| ClientError::malformed(status.as_u16(), body))
}
