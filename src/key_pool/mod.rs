//! # 密钥池
//!
//! 从进程环境构建 Gemini API 密钥池，并提供选择算法。

pub mod algorithms;
pub mod env_source;
pub mod loader;
pub mod types;

pub use algorithms::{
    KeySelector, RandomKeySelector, RoundRobinKeySelector, create_key_selector,
};
pub use env_source::{EnvSource, ProcessEnv, StaticEnv};
pub use loader::{KeyPoolLoader, sanitize_key};
pub use types::{ApiKey, KeyPool, SelectionStrategy};
