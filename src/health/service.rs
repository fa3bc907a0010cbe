//! # 健康检查服务
//!
//! 纯本地检查：从环境构建密钥池，不访问上游。

use std::sync::Arc;

use super::types::HealthStatus;
use crate::key_pool::{EnvSource, KeyPoolLoader, KeySelector};
use crate::{
    ldebug,
    logging::{LogComponent, LogStage},
};

/// 健康检查服务
pub struct HealthService {
    loader: KeyPoolLoader,
    env: Arc<dyn EnvSource>,
    selector: Arc<dyn KeySelector>,
}

impl HealthService {
    /// 创建新的健康检查服务
    #[must_use]
    pub fn new(
        loader: KeyPoolLoader,
        env: Arc<dyn EnvSource>,
        selector: Arc<dyn KeySelector>,
    ) -> Self {
        Self {
            loader,
            env,
            selector,
        }
    }

    /// 报告密钥可用性
    #[must_use]
    pub fn check_health(&self, request_id: &str) -> HealthStatus {
        let pool = self.loader.list_keys(self.env.as_ref());
        let status = self
            .selector
            .pick_one(&pool, request_id)
            .map_or_else(HealthStatus::missing, |key| {
                HealthStatus::available(key.source(), pool.len())
            });

        ldebug!(
            request_id,
            LogStage::HealthCheck,
            LogComponent::HealthChecker,
            "check_health",
            "Health check evaluated",
            status = %status.status,
            source = status.source.as_str(),
            key_count = status.key_count
        );

        status
    }
}
