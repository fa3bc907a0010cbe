//! 应用上下文（DI 容器）
//!
//! 统一持有跨模块共享的服务实例，便于在测试中注入替身实现。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::gateway::FailoverGateway;
use crate::health::HealthService;
use crate::key_pool::{EnvSource, KeyPoolLoader, ProcessEnv, create_key_selector};
use crate::providers::{GeminiUpstream, UpstreamCaller};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<FailoverGateway>,
    pub health: Arc<HealthService>,
}

impl AppContext {
    /// 生产装配：进程环境 + Gemini REST 上游
    #[must_use]
    pub fn from_config(config: AppConfig) -> Self {
        let upstream = Arc::new(GeminiUpstream::new(config.gemini.clone()));
        Self::with_parts(config, Arc::new(ProcessEnv), upstream)
    }

    /// 注入环境与上游（测试与嵌入场景）
    ///
    /// 健康检查使用独立的选择器实例，频繁的健康轮询不影响网关的轮询起点。
    #[must_use]
    pub fn with_parts(
        config: AppConfig,
        env: Arc<dyn EnvSource>,
        upstream: Arc<dyn UpstreamCaller>,
    ) -> Self {
        let loader = KeyPoolLoader::from_config(&config.key_pool);
        let gateway = FailoverGateway::new(
            loader.clone(),
            Arc::clone(&env),
            create_key_selector(config.key_pool.strategy),
            upstream,
            config.gemini.test_model.clone(),
        );
        let health = HealthService::new(
            loader,
            env,
            create_key_selector(config.key_pool.strategy),
        );

        Self {
            config: Arc::new(config),
            gateway: Arc::new(gateway),
            health: Arc::new(health),
        }
    }
}
