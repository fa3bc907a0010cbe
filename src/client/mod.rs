//! # 网关客户端模块
//!
//! 浏览器端逻辑的 Rust 版本：健康状态同步、连接测试、带重试的内容生成

pub mod api;
pub mod error;
pub mod generate;
pub mod reconcile;

pub use api::{DEFAULT_CLIENT_TIMEOUT, GatewayClient};
pub use error::{ClientError, QUOTA_EXCEEDED_MESSAGE, TIMEOUT_MESSAGE};
pub use generate::{ContentClient, extract_json_payload};
pub use reconcile::{
    ClientKeyState, KeyReconciler, KeySelectionPrompt, KeyStatus, ReconcileConfig,
    ReconcileSession,
};
