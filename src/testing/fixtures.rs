//! # 测试数据 Fixtures
//!
//! 提供测试用的环境与请求预设

use serde_json::json;

use crate::key_pool::{ApiKey, KeyPool, StaticEnv};
use crate::providers::GenerationRequest;

/// 环境变量测试数据构建器
#[derive(Debug, Default)]
pub struct EnvFixture {
    vars: Vec<(String, String)>,
}

impl EnvFixture {
    /// 创建空环境
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 `GEMINI_API_KEY`
    #[must_use]
    pub fn primary(self, value: &str) -> Self {
        self.var("GEMINI_API_KEY", value)
    }

    /// 设置 `GEMINI_KEY_1..=N`
    #[must_use]
    pub fn numbered(mut self, values: &[&str]) -> Self {
        for (index, value) in values.iter().enumerate() {
            self = self.var(&format!("GEMINI_KEY_{}", index + 1), value);
        }
        self
    }

    /// 设置任意变量
    #[must_use]
    pub fn var(mut self, name: &str, value: &str) -> Self {
        self.vars.push((name.to_string(), value.to_string()));
        self
    }

    /// 构建环境
    #[must_use]
    pub fn build(self) -> StaticEnv {
        self.vars.into_iter().collect()
    }
}

/// 由编号密钥构成的池
#[must_use]
pub fn numbered_pool(values: &[&str]) -> KeyPool {
    KeyPool::from_keys(
        values
            .iter()
            .enumerate()
            .map(|(index, value)| ApiKey::new(*value, format!("GEMINI_KEY_{}", index + 1))),
    )
}

/// 简单文本生成请求
#[must_use]
pub fn text_request(prompt: &str) -> GenerationRequest {
    GenerationRequest {
        model: None,
        contents: json!(prompt),
        config: None,
    }
}
