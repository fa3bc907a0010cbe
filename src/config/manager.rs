//! # 配置管理器
//!
//! 统一的配置加载入口：配置文件 + `PROXY_*` 环境变量覆盖 + 校验

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::AppConfig;
use crate::error::{ProxyError, Result};

/// 配置文件路径环境变量
pub const CONFIG_PATH_ENV: &str = "GEMINI_PROXY_CONFIG_PATH";

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// 当前配置
    config: AppConfig,
    /// 实际读取的配置文件（不存在时为 `None`）
    source_path: Option<PathBuf>,
    /// 已应用的环境变量覆盖
    env_overrides: BTreeMap<String, String>,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 路径优先级：显式参数 > `GEMINI_PROXY_CONFIG_PATH` > `config/config.{RUST_ENV}.toml`
    pub fn new(explicit_path: Option<&Path>) -> Result<Self> {
        let explicit = explicit_path.is_some() || env::var(CONFIG_PATH_ENV).is_ok();
        let config_file = explicit_path.map_or_else(Self::default_config_path, Path::to_path_buf);

        let env_overrides = Self::build_env_overrides(env::vars());
        Self::load(&config_file, explicit, env_overrides)
    }

    /// 从指定文件和覆盖项创建配置管理器
    ///
    /// `required` 为真时文件必须存在，否则使用默认配置。
    pub fn load(
        config_path: &Path,
        required: bool,
        env_overrides: BTreeMap<String, String>,
    ) -> Result<Self> {
        let (mut config, source_path) = if config_path.exists() {
            (
                Self::load_config_file(config_path)?,
                Some(config_path.to_path_buf()),
            )
        } else if required {
            return Err(ProxyError::config(format!(
                "配置文件不存在: {}",
                config_path.display()
            )));
        } else {
            warn!(
                "配置文件不存在: {}，使用默认配置",
                config_path.display()
            );
            (AppConfig::default(), None)
        };

        Self::apply_env_overrides(&mut config, &env_overrides)?;
        config.validate()?;

        info!("配置管理器初始化完成");
        info!(
            "- 配置文件: {}",
            source_path
                .as_ref()
                .map_or_else(|| "默认配置".to_string(), |p| p.display().to_string())
        );
        info!("- 环境变量覆盖: {} 个", env_overrides.len());

        Ok(Self {
            config,
            source_path,
            env_overrides,
        })
    }

    /// 获取当前配置
    #[must_use]
    pub fn get_config(&self) -> AppConfig {
        self.config.clone()
    }

    /// 用命令行参数覆盖监听地址
    pub fn override_listener(&mut self, host: Option<String>, port: Option<u16>) -> Result<()> {
        if let Some(host) = host {
            self.config.server.host = host;
        }
        if let Some(port) = port {
            self.config.server.port = port;
        }
        self.config.validate()
    }

    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    #[must_use]
    pub fn env_override_count(&self) -> usize {
        self.env_overrides.len()
    }

    fn default_config_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        PathBuf::from(format!("config/config.{env}.toml"))
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        let config_content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })?;

        toml::from_str(&config_content).map_err(|e| {
            ProxyError::config_with_source(
                format!("TOML解析失败 - 配置文件: {}, 详细错误: {e}", path.display()),
                e,
            )
        })
    }

    /// 构建环境变量覆盖映射
    ///
    /// 例如: `PROXY_SERVER_PORT` -> `server.port`
    pub fn build_env_overrides<I>(vars: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: BTreeMap<String, String> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix("PROXY_")
                    .map(|config_key| (config_key.to_lowercase().replace('_', "."), value))
            })
            .collect();

        debug!("发现 {} 个环境变量覆盖", overrides.len());
        overrides
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &BTreeMap<String, String>,
    ) -> Result<()> {
        for (path, value) in overrides {
            debug!("应用环境变量覆盖: {} = {}", path, value);
            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    /// 将环境变量覆盖应用到配置对象
    fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["server", "host"] => config.server.host = value.to_string(),
            ["server", "port"] => config.server.port = parse_value(path, value)?,
            ["server", "enable", "cors"] => config.server.enable_cors = parse_value(path, value)?,
            ["server", "cors", "origins"] => {
                config.server.cors_origins = split_list(value);
            }
            ["server", "static", "dir"] => {
                config.server.static_dir = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            ["server", "max", "request", "size"] => {
                config.server.max_request_size = parse_value(path, value)?;
            }
            ["gemini", "base", "url"] => config.gemini.base_url = value.to_string(),
            ["gemini", "api", "version"] => config.gemini.api_version = value.to_string(),
            ["gemini", "default", "model"] => config.gemini.default_model = value.to_string(),
            ["gemini", "test", "model"] => config.gemini.test_model = value.to_string(),
            ["gemini", "request", "timeout", "secs"] => {
                config.gemini.request_timeout_secs = parse_value(path, value)?;
            }
            ["key", "pool", "named", "vars"] => config.key_pool.named_vars = split_list(value),
            ["key", "pool", "numbered", "prefix"] => {
                config.key_pool.numbered_prefix = value.to_string();
            }
            ["key", "pool", "numbered", "max"] => {
                config.key_pool.numbered_max = parse_value(path, value)?;
            }
            ["key", "pool", "strategy"] => {
                config.key_pool.strategy = value.parse().map_err(ProxyError::config)?;
            }
            _ => {
                warn!("未知的配置路径，忽略环境变量覆盖: {}", path);
            }
        }

        Ok(())
    }
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .map_err(|e| ProxyError::config_with_source(format!("无效的配置值 {path} = {value}"), e))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}
