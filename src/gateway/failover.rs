//! # 故障转移网关
//!
//! 每次调用都从环境重新构建密钥池，按打乱后的顺序逐个尝试。
//! 配额耗尽与密钥无效会换下一个密钥，其他失败立即返回。
//! 调用之间不共享任何状态。

use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult, KeyFailureKind};
use crate::key_pool::{EnvSource, KeyPool, KeyPoolLoader, KeySelector};
use crate::providers::{
    GenerationOutcome, GenerationRequest, GenerationResponse, UpstreamCaller,
};
use crate::{
    ldebug, linfo,
    logging::{LogComponent, LogStage},
    lwarn,
};

/// 连接测试使用的提示词
pub const CONNECTION_TEST_PROMPT: &str = "Say 'Connection Successful'";

/// 故障转移网关
pub struct FailoverGateway {
    loader: KeyPoolLoader,
    env: Arc<dyn EnvSource>,
    selector: Arc<dyn KeySelector>,
    upstream: Arc<dyn UpstreamCaller>,
    test_model: String,
}

impl FailoverGateway {
    #[must_use]
    pub fn new(
        loader: KeyPoolLoader,
        env: Arc<dyn EnvSource>,
        selector: Arc<dyn KeySelector>,
        upstream: Arc<dyn UpstreamCaller>,
        test_model: String,
    ) -> Self {
        Self {
            loader,
            env,
            selector,
            upstream,
            test_model,
        }
    }

    /// 当前密钥池
    #[must_use]
    pub fn current_pool(&self) -> KeyPool {
        self.loader.list_keys(self.env.as_ref())
    }

    /// 带故障转移的生成调用
    pub async fn generate(
        &self,
        request_id: &str,
        request: &GenerationRequest,
    ) -> GatewayResult<GenerationResponse> {
        let pool = self.current_pool();
        if pool.is_empty() {
            lwarn!(
                request_id,
                LogStage::Scheduling,
                LogComponent::Gateway,
                "no_key_configured",
                "No Gemini API key configured, skipping upstream call"
            );
            return Err(GatewayError::NoKeyConfigured);
        }

        let order = self.selector.shuffled_order(&pool, request_id);
        let mut last_key_failure: Option<(KeyFailureKind, String)> = None;
        let mut attempts = 0usize;

        for (index, key) in order.iter().enumerate() {
            attempts += 1;
            ldebug!(
                request_id,
                LogStage::UpstreamRequest,
                LogComponent::Gateway,
                "attempt",
                "Trying API key",
                attempt = index + 1,
                pool_size = order.len(),
                source = key.source()
            );

            match self.upstream.invoke(key, request, request_id).await {
                GenerationOutcome::Success(response) => {
                    linfo!(
                        request_id,
                        LogStage::Response,
                        LogComponent::Gateway,
                        "generate_success",
                        "Generation succeeded",
                        attempts = attempts,
                        source = key.source()
                    );
                    return Ok(response);
                }
                GenerationOutcome::QuotaExceeded { message } => {
                    lwarn!(
                        request_id,
                        LogStage::UpstreamRequest,
                        LogComponent::Gateway,
                        "key_quota_exceeded",
                        "Key quota exhausted, failing over",
                        source = key.source(),
                        error = %message
                    );
                    last_key_failure = Some((KeyFailureKind::QuotaExceeded, message));
                }
                GenerationOutcome::InvalidKey { message } => {
                    lwarn!(
                        request_id,
                        LogStage::UpstreamRequest,
                        LogComponent::Gateway,
                        "key_invalid",
                        "Key rejected as invalid, failing over",
                        source = key.source(),
                        error = %message
                    );
                    last_key_failure = Some((KeyFailureKind::InvalidKey, message));
                }
                GenerationOutcome::OtherFailure(failure) => {
                    lwarn!(
                        request_id,
                        LogStage::ResponseFailure,
                        LogComponent::Gateway,
                        "upstream_failure",
                        "Non key-specific upstream failure, stopping failover",
                        kind = failure.kind.as_str(),
                        status = ?failure.status,
                        attempts = attempts,
                        error = %failure.message
                    );
                    return Err(GatewayError::upstream(
                        failure.kind,
                        failure.status,
                        failure.message,
                    ));
                }
            }
        }

        let (kind, message) = last_key_failure.unwrap_or((
            KeyFailureKind::InvalidKey,
            "No API key produced a response".to_string(),
        ));

        lwarn!(
            request_id,
            LogStage::ResponseFailure,
            LogComponent::Gateway,
            "keys_exhausted",
            "All API keys failed",
            kind = kind.as_str(),
            attempts = attempts
        );

        Err(GatewayError::KeysExhausted {
            kind,
            message,
            attempts,
        })
    }

    /// 连接测试：单个密钥、单次调用、不做故障转移
    pub async fn test_connection(&self, request_id: &str) -> GatewayResult<String> {
        let pool = self.current_pool();
        let Some(key) = self.selector.pick_one(&pool, request_id) else {
            return Err(GatewayError::NoKeyConfigured);
        };

        let request = GenerationRequest::from_prompt(&self.test_model, CONNECTION_TEST_PROMPT);

        match self.upstream.invoke(&key, &request, request_id).await {
            GenerationOutcome::Success(response) => {
                linfo!(
                    request_id,
                    LogStage::Response,
                    LogComponent::Gateway,
                    "test_connection",
                    "Connection test succeeded",
                    source = key.source()
                );
                Ok(response.text().to_string())
            }
            GenerationOutcome::QuotaExceeded { message } => Err(GatewayError::KeysExhausted {
                kind: KeyFailureKind::QuotaExceeded,
                message,
                attempts: 1,
            }),
            GenerationOutcome::InvalidKey { message } => Err(GatewayError::KeysExhausted {
                kind: KeyFailureKind::InvalidKey,
                message,
                attempts: 1,
            }),
            GenerationOutcome::OtherFailure(failure) => Err(GatewayError::upstream(
                failure.kind,
                failure.status,
                failure.message,
            )),
        }
    }

    /// 选择器名称
    #[must_use]
    pub fn selector_name(&self) -> &'static str {
        self.selector.name()
    }

    /// 上游调用器名称
    #[must_use]
    pub fn upstream_name(&self) -> &'static str {
        self.upstream.name()
    }
}
