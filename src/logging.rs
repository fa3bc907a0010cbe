//! # 日志配置模块
//!
//! 提供统一的日志初始化与结构化日志宏。
//!
//! 所有业务日志统一使用 `linfo!` / `ldebug!` / `lwarn!` / `lerror!`，
//! 固定携带 `request_id`、阶段、组件与操作名，便于按请求串联排查。

use std::env;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 日志阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    /// 服务启动
    Startup,
    /// 服务关闭
    Shutdown,
    /// 配置加载
    Configuration,
    /// 收到请求
    RequestStart,
    /// 密钥调度
    Scheduling,
    /// 上游请求
    UpstreamRequest,
    /// 响应成功
    Response,
    /// 响应失败
    ResponseFailure,
    /// 健康检查
    HealthCheck,
    /// 客户端状态同步
    Reconcile,
}

impl LogStage {
    /// 转换为日志字段值
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::RequestStart => "request_start",
            Self::Scheduling => "scheduling",
            Self::UpstreamRequest => "upstream_request",
            Self::Response => "response",
            Self::ResponseFailure => "response_failure",
            Self::HealthCheck => "health_check",
            Self::Reconcile => "reconcile",
        }
    }
}

/// 日志组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    /// 主程序
    Main,
    /// HTTP 服务装配
    ServerSetup,
    /// 配置管理
    Config,
    /// 密钥池
    KeyPool,
    /// 密钥选择器
    Selector,
    /// 上游调用
    Upstream,
    /// 故障转移网关
    Gateway,
    /// 健康检查
    HealthChecker,
    /// HTTP 处理器
    Handler,
    /// 客户端
    Client,
}

impl LogComponent {
    /// 转换为日志字段值
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::ServerSetup => "server_setup",
            Self::Config => "config",
            Self::KeyPool => "key_pool",
            Self::Selector => "selector",
            Self::Upstream => "upstream",
            Self::Gateway => "gateway",
            Self::HealthChecker => "health_checker",
            Self::Handler => "handler",
            Self::Client => "client",
        }
    }
}

/// 结构化 info 日志
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($fields:tt)+)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = $stage.as_str(),
            component = $component.as_str(),
            operation = $operation,
            $($($fields)+,)?
            "{}",
            $message
        )
    };
}

/// 初始化优化的日志系统
pub fn init_optimized_logging(log_level: Option<&String>) {
    let level = log_level.map_or("info", std::string::String::as_str);

    // 默认配置：本 crate 输出 debug，HTTP 依赖库只保留告警
    let default_filter =
        format!("{level},gemini_key_proxy=debug,hyper=warn,reqwest=warn,tower_http=info");

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    let init_result = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    if init_result.is_err() {
        // 已有全局 subscriber（例如测试环境），保持现状
        return;
    }

    tracing::info!("📋 Logging initialized, set RUST_LOG to override the default filter");
}

/// 环境变量设置指南
pub fn print_logging_help() {
    println!("📋 日志配置指南:");
    println!("  RUST_LOG=info                          # 标准日志级别");
    println!("  RUST_LOG=debug                         # 调试级别");
    println!("  RUST_LOG=gemini_key_proxy=trace        # 应用详细追踪");
    println!("  RUST_LOG=info,tower_http=debug         # 查看每个 HTTP 请求");
    println!();
    println!("💡 密钥只会以掩码形式出现在日志中（前 4 位 + ...）");
}
