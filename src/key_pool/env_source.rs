//! # 环境变量来源
//!
//! 密钥只存在于进程环境中。读取环境的动作被抽象为 `EnvSource`，
//! 测试与嵌入场景使用内存中的 `StaticEnv`。

use std::collections::HashMap;

/// 环境变量读取接口
pub trait EnvSource: Send + Sync {
    /// 读取变量，不存在或非 UTF-8 时返回 `None`
    fn var(&self, name: &str) -> Option<String>;
}

/// 读取当前进程环境
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// 内存中的固定环境
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    vars: HashMap<String, String>,
}

impl StaticEnv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式设置变量
    #[must_use]
    pub fn with<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K, V> FromIterator<(K, V)> for StaticEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for StaticEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_env_lookup() {
        let env = StaticEnv::new().with("GEMINI_API_KEY", "abc");
        assert_eq!(env.var("GEMINI_API_KEY").as_deref(), Some("abc"));
        assert_eq!(env.var("API_KEY"), None);

        let env: StaticEnv = [("GEMINI_KEY_1", "x")].into_iter().collect();
        assert_eq!(env.var("GEMINI_KEY_1").as_deref(), Some("x"));
    }

    #[test]
    fn test_process_env_missing_var() {
        assert_eq!(
            ProcessEnv.var("GEMINI_KEY_PROXY_TEST_SURELY_UNSET_VARIABLE"),
            None
        );
    }
}
