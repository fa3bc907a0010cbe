//! # 内容生成调用
//!
//! 客户端调用 `/api/ai/generate` 的重试策略，以及从模型输出中提取 JSON。

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::api::GatewayClient;
use super::error::ClientError;
use super::reconcile::KeySelectionPrompt;
use crate::logging::{LogComponent, LogStage};
use crate::providers::GenerationResponse;
use crate::{ldebug, linfo, lwarn};

/// 默认整体重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 2;

const EMPTY_OUTPUT: &str = "AI response was empty.";
const NO_JSON_OUTPUT: &str = "The AI response was malformed. Please try again.";
const INVALID_JSON_OUTPUT: &str = "The AI generated an invalid format. Try simplifying your request.";

/// 内容生成客户端
pub struct ContentClient {
    gateway: GatewayClient,
    prompt: Option<Arc<dyn KeySelectionPrompt>>,
    max_retries: u32,
}

impl ContentClient {
    #[must_use]
    pub const fn new(gateway: GatewayClient) -> Self {
        Self {
            gateway,
            prompt: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// 密钥无效时打开密钥选择流程
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn KeySelectionPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 生成内容
    ///
    /// - 网关 5xx、连接失败、响应体异常：整体重试，最多 `max_retries` 次
    /// - 超时、配额耗尽、服务端未配置密钥：立即返回
    /// - 密钥无效：有密钥选择能力时打开一次选择流程，然后不带重试再调用一次
    pub async fn generate(&self, payload: &Value) -> Result<GenerationResponse, ClientError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut retries_left = self.max_retries;
        let mut key_reselected = false;

        loop {
            let err = match self.gateway.generate(&request_id, payload).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let reselect_prompt = match err {
                ClientError::InvalidKey { .. } if !key_reselected => self.prompt.as_ref(),
                _ => None,
            };

            if let Some(prompt) = reselect_prompt {
                linfo!(
                    request_id,
                    LogStage::RequestStart,
                    LogComponent::Client,
                    "reselect_key",
                    "Invalid API key, opening key selection"
                );
                prompt.open_select_key().await?;
                key_reselected = true;
                retries_left = 0;
            } else if err.is_retryable() && retries_left > 0 {
                retries_left -= 1;
                ldebug!(
                    request_id,
                    LogStage::RequestStart,
                    LogComponent::Client,
                    "retry_generate",
                    "Generation failed, retrying",
                    retries_left = retries_left,
                    error = %err
                );
            } else {
                lwarn!(
                    request_id,
                    LogStage::ResponseFailure,
                    LogComponent::Client,
                    "generate_failed",
                    "Generation failed",
                    error = %err
                );
                return Err(err);
            }
        }
    }

    /// 生成内容并把模型输出解析为结构化数据
    pub async fn generate_json<T: DeserializeOwned>(&self, payload: &Value) -> Result<T, ClientError> {
        let response = self.generate(payload).await?;
        let value = extract_json_payload(response.text())?;
        serde_json::from_value(value).map_err(|_| ClientError::AiOutput(INVALID_JSON_OUTPUT))
    }
}

/// 从模型输出中提取 JSON
///
/// 去掉 Markdown 代码围栏后直接解析；失败时退回到第一个 `{` 与最后一个 `}` 之间的内容。
pub fn extract_json_payload(text: &str) -> Result<Value, ClientError> {
    if text.trim().is_empty() {
        return Err(ClientError::AiOutput(EMPTY_OUTPUT));
    }

    let cleaned = text.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    if let Ok(value) = serde_json::from_str(cleaned) {
        return Ok(value);
    }

    let block = cleaned
        .find('{')
        .zip(cleaned.rfind('}'))
        .filter(|(start, end)| start < end)
        .map(|(start, end)| &cleaned[start..=end])
        .ok_or(ClientError::AiOutput(NO_JSON_OUTPUT))?;

    serde_json::from_str(block).map_err(|_| ClientError::AiOutput(INVALID_JSON_OUTPUT))
}
