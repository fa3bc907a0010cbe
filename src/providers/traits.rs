//! # 上游调用特征定义

use super::types::{GenerationOutcome, GenerationRequest};
use crate::key_pool::ApiKey;
use async_trait::async_trait;

/// 用单个密钥调用一次上游生成接口
///
/// 实现不得跨密钥缓存客户端；所有失败都以 `GenerationOutcome` 表达，不返回错误。
#[async_trait]
pub trait UpstreamCaller: Send + Sync {
    async fn invoke(
        &self,
        key: &ApiKey,
        request: &GenerationRequest,
        request_id: &str,
    ) -> GenerationOutcome;

    /// 获取调用器名称
    fn name(&self) -> &'static str;
}
