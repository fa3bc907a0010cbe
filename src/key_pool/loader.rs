//! # 密钥池加载
//!
//! 从具名变量（默认 `GEMINI_API_KEY`、`API_KEY`、`VITE_GEMINI_API_KEY`）
//! 与编号序列（`GEMINI_KEY_1..=N`）收集密钥。

use super::env_source::EnvSource;
use super::types::{ApiKey, KeyPool};
use crate::config::KeyPoolConfig;

/// 密钥池加载器
#[derive(Debug, Clone)]
pub struct KeyPoolLoader {
    named_vars: Vec<String>,
    numbered_prefix: String,
    numbered_max: usize,
}

impl Default for KeyPoolLoader {
    fn default() -> Self {
        Self::from_config(&KeyPoolConfig::default())
    }
}

impl KeyPoolLoader {
    #[must_use]
    pub fn new(named_vars: Vec<String>, numbered_prefix: String, numbered_max: usize) -> Self {
        Self {
            named_vars,
            numbered_prefix,
            numbered_max,
        }
    }

    #[must_use]
    pub fn from_config(config: &KeyPoolConfig) -> Self {
        Self::new(
            config.named_vars.clone(),
            config.numbered_prefix.clone(),
            config.numbered_max,
        )
    }

    /// 按顺序读取所有候选变量并构建密钥池
    ///
    /// 空池是合法状态，不返回错误。
    #[must_use]
    pub fn list_keys(&self, env: &dyn EnvSource) -> KeyPool {
        let numbered =
            (1..=self.numbered_max).map(|index| format!("{}{index}", self.numbered_prefix));

        let candidates = self
            .named_vars
            .iter()
            .cloned()
            .chain(numbered)
            .filter_map(|name| {
                let raw = env.var(&name)?;
                let value = sanitize_key(&raw)?;
                Some(ApiKey::new(value, name))
            });

        KeyPool::from_keys(candidates)
    }

    /// 参与扫描的变量总数
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.named_vars.len() + self.numbered_max
    }
}

/// 清理原始值：去空白，去掉一对匹配的首尾引号，再去空白；空值丢弃
#[must_use]
pub fn sanitize_key(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|quote| {
            trimmed
                .strip_prefix(*quote)
                .and_then(|rest| rest.strip_suffix(*quote))
        })
        .unwrap_or(trimmed)
        .trim();

    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_pool::StaticEnv;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("abc", Some("abc"))]
    #[case("  abc  ", Some("abc"))]
    #[case("\"abc\"", Some("abc"))]
    #[case("'abc'", Some("abc"))]
    #[case(" \" abc \" ", Some("abc"))]
    #[case("\"abc", Some("\"abc"))]
    #[case("\"abc'", Some("\"abc'"))]
    #[case("\"\"", None)]
    #[case("   ", None)]
    #[case("", None)]
    fn test_sanitize_key(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(sanitize_key(raw).as_deref(), expected);
    }

    #[test]
    fn test_list_keys_collects_named_and_numbered() {
        let env = StaticEnv::new()
            .with("GEMINI_API_KEY", "\"a\"")
            .with("GEMINI_KEY_1", " b ")
            .with("GEMINI_KEY_2", "a")
            .with("GEMINI_KEY_3", "")
            .with("GEMINI_KEY_4", "c");

        let pool = KeyPoolLoader::default().list_keys(&env);
        let values: Vec<&str> = pool.keys().iter().map(ApiKey::value).collect();

        assert_eq!(values, vec!["a", "b", "c"]);
        assert_eq!(pool.sources(), vec!["GEMINI_API_KEY", "GEMINI_KEY_1", "GEMINI_KEY_4"]);
    }

    #[test]
    fn test_list_keys_respects_numbered_bound() {
        let env = StaticEnv::new()
            .with("GEMINI_KEY_1", "k1")
            .with("GEMINI_KEY_11", "k11");

        assert_eq!(KeyPoolLoader::default().list_keys(&env).len(), 1);

        let wide = KeyPoolLoader::new(vec![], "GEMINI_KEY_".to_string(), 20);
        assert_eq!(wide.list_keys(&env).len(), 2);
        assert_eq!(wide.candidate_count(), 20);
    }

    #[test]
    fn test_empty_environment_gives_empty_pool() {
        let pool = KeyPoolLoader::default().list_keys(&StaticEnv::new());
        assert!(pool.is_empty());
    }
}
