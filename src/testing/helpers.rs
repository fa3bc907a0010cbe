//! # 测试辅助函数
//!
//! 提供通用的测试工具和辅助函数

use std::sync::Once;
use tracing::Level;

use crate::config::GeminiConfig;

static INIT: Once = Once::new();

/// 初始化测试日志
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 指向 Mock 服务器的 Gemini 配置
#[must_use]
pub fn gemini_config_for(base_url: &str, timeout_secs: u64) -> GeminiConfig {
    GeminiConfig {
        base_url: base_url.to_string(),
        request_timeout_secs: timeout_secs,
        ..GeminiConfig::default()
    }
}
