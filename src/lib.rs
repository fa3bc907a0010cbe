//! # Gemini Key Proxy Library
//!
//! Gemini API 密钥池网关：从环境变量收集密钥，按随机顺序逐个尝试，
//! 配额耗尽或密钥无效时透明切换到下一个密钥。

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod key_pool;
pub mod logging;
pub mod providers;
pub mod server;
pub mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{GatewayError, ProxyError, Result};
