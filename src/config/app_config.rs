//! # 应用配置结构定义

use crate::key_pool::SelectionStrategy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP 服务配置
    pub server: ServerConfig,
    /// Gemini 上游配置
    pub gemini: GeminiConfig,
    /// 密钥池配置
    pub key_pool: KeyPoolConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 是否启用 CORS
    pub enable_cors: bool,
    /// 允许的来源，包含 `*` 或为空时允许任意来源
    pub cors_origins: Vec<String>,
    /// 前端构建产物目录（生产模式），未配置时非 API 路径返回 404
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
    /// 请求体大小上限（字节）
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            static_dir: None,
            max_request_size: 50 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// 监听地址字符串
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// CORS 是否允许任意来源
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }

    /// 解析为 `SocketAddr`
    pub fn socket_addr(&self) -> crate::error::Result<SocketAddr> {
        self.bind_address().parse().map_err(|e| {
            crate::error::ProxyError::config_with_source(
                format!("无效的监听地址: {}", self.bind_address()),
                e,
            )
        })
    }
}

/// Gemini 上游配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// REST 基础地址
    pub base_url: String,
    /// API 版本路径
    pub api_version: String,
    /// 请求未指定模型时使用
    pub default_model: String,
    /// 连接测试使用的模型
    pub test_model: String,
    /// 单次上游调用超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            api_version: "v1beta".to_string(),
            default_model: "gemini-2.5-flash".to_string(),
            test_model: "gemini-2.5-flash".to_string(),
            request_timeout_secs: 90,
        }
    }
}

impl GeminiConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 密钥池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPoolConfig {
    /// 具名变量，按顺序读取
    pub named_vars: Vec<String>,
    /// 编号序列前缀
    pub numbered_prefix: String,
    /// 编号序列上限（含）
    pub numbered_max: usize,
    /// 选择策略
    pub strategy: SelectionStrategy,
}

impl Default for KeyPoolConfig {
    fn default() -> Self {
        Self {
            named_vars: vec![
                "GEMINI_API_KEY".to_string(),
                "API_KEY".to_string(),
                "VITE_GEMINI_API_KEY".to_string(),
            ],
            numbered_prefix: "GEMINI_KEY_".to_string(),
            numbered_max: 10,
            strategy: SelectionStrategy::Random,
        }
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> crate::error::Result<()> {
        crate::ensure_config!(!self.server.host.is_empty(), "服务器主机不能为空");
        crate::ensure_config!(self.server.max_request_size > 0, "请求体大小上限必须大于0");
        self.server.socket_addr()?;

        url::Url::parse(&self.gemini.base_url).map_err(|e| {
            crate::error::ProxyError::config_with_source(
                format!("无效的 Gemini 基础地址: {}", self.gemini.base_url),
                e,
            )
        })?;
        crate::ensure_config!(!self.gemini.api_version.is_empty(), "API 版本不能为空");
        crate::ensure_config!(!self.gemini.default_model.is_empty(), "默认模型不能为空");
        crate::ensure_config!(!self.gemini.test_model.is_empty(), "测试模型不能为空");
        crate::ensure_config!(
            self.gemini.request_timeout_secs > 0,
            "上游超时必须大于0秒"
        );

        crate::ensure_config!(
            !self.key_pool.numbered_prefix.is_empty(),
            "编号密钥前缀不能为空"
        );

        if let Some(dir) = &self.server.static_dir {
            crate::ensure_config!(dir.is_dir(), "静态资源目录不存在: {}", dir.display());
        }

        Ok(())
    }
}
