//! # Gemini Key Proxy 主程序
//!
//! 启动 `/api` 网关，Ctrl+C 时优雅退出

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use gemini_key_proxy::{
    app::AppContext,
    config::ConfigManager,
    lerror, linfo, lwarn,
    logging::{self, LogComponent, LogStage},
    server::GatewayServer,
};

#[derive(Parser)]
#[command(
    name = "gemini-key-proxy",
    version,
    about = "Gemini API key-pool gateway with transparent failover"
)]
struct Cli {
    /// 配置文件路径（默认读取 config/config.{RUST_ENV}.toml，不存在时使用内置默认值）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 覆盖监听主机
    #[arg(long)]
    host: Option<String>,

    /// 覆盖监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别（未设置时读取 RUST_LOG）
    #[arg(long)]
    log_level: Option<String>,

    /// 打印日志配置说明后退出
    #[arg(long)]
    logging_help: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.logging_help {
        logging::print_logging_help();
        return Ok(());
    }

    logging::init_optimized_logging(cli.log_level.as_ref());

    let mut config_manager =
        ConfigManager::new(cli.config.as_deref()).context("配置加载失败")?;
    config_manager
        .override_listener(cli.host, cli.port)
        .context("监听地址无效")?;
    let config = config_manager.get_config();

    linfo!(
        "system",
        LogStage::Configuration,
        LogComponent::Config,
        "config_loaded",
        "Configuration loaded",
        source = ?config_manager.source_path(),
        env_overrides = config_manager.env_override_count(),
        strategy = %config.key_pool.strategy
    );

    let context = Arc::new(AppContext::from_config(config));
    log_key_pool_summary(&context);

    let server = GatewayServer::new(Arc::clone(&context));
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动",
        address = %server.bind_address()
    );

    if let Err(e) = server.serve(shutdown_signal()).await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            "服务启动失败",
            error = %e
        );
        return Err(e.into());
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "服务正常关闭"
    );
    Ok(())
}

/// 启动时只记录来源变量名与数量，不输出密钥本身
fn log_key_pool_summary(context: &AppContext) {
    let pool = context.gateway.current_pool();
    if pool.is_empty() {
        lwarn!(
            "system",
            LogStage::Startup,
            LogComponent::KeyPool,
            "no_keys",
            "No Gemini API key configured, AI endpoints will report missing"
        );
        return;
    }

    let sources = pool.sources().join(",");
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::KeyPool,
        "key_pool_loaded",
        "Gemini key pool loaded",
        key_count = pool.len(),
        sources = %sources,
        selector = context.gateway.selector_name(),
        upstream = context.gateway.upstream_name()
    );
}

/// 等待 Ctrl+C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "ctrl_c",
            "Ctrl+C signal received, shutting down"
        ),
        Err(e) => lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Main,
            "ctrl_c_error",
            "Failed to listen for Ctrl+C",
            error = %e
        ),
    }
}
