//! # 健康检查模块
//!
//! 报告服务端是否配置了 Gemini 密钥

pub mod service;
pub mod types;

pub use service::HealthService;
pub use types::{HealthStatus, KeyAvailability, NO_SOURCE};
