//! # 密钥池类型定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 单个 API 密钥及其来源
///
/// `source` 为读取该密钥的环境变量名。`Debug` 输出只保留前 4 位，
/// 避免密钥经日志泄露。
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey {
    value: String,
    source: String,
}

impl ApiKey {
    pub fn new<V: Into<String>, S: Into<String>>(value: V, source: S) -> Self {
        Self {
            value: value.into(),
            source: source.into(),
        }
    }

    /// 原始密钥值，仅用于构造上游请求
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// 来源环境变量名
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 掩码形式（前 4 位 + `...`）
    #[must_use]
    pub fn masked(&self) -> String {
        let prefix: String = self.value.chars().take(4).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &self.masked())
            .field("source", &self.source)
            .finish()
    }
}

/// 密钥池
///
/// 每次健康检查与生成请求都会从环境重新构建，不做原地修改。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPool {
    keys: Vec<ApiKey>,
}

impl KeyPool {
    /// 按顺序构建，完全相同的值只保留第一次出现的
    #[must_use]
    pub fn from_keys<I: IntoIterator<Item = ApiKey>>(keys: I) -> Self {
        let mut unique: Vec<ApiKey> = Vec::new();
        for key in keys {
            if !unique.iter().any(|existing| existing.value == key.value) {
                unique.push(key);
            }
        }
        Self { keys: unique }
    }

    #[must_use]
    pub fn keys(&self) -> &[ApiKey] {
        &self.keys
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// 所有来源名（用于启动日志）
    #[must_use]
    pub fn sources(&self) -> Vec<&str> {
        self.keys.iter().map(ApiKey::source).collect()
    }
}

/// 密钥选择策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// 均匀随机
    #[default]
    Random,
    /// 轮询
    RoundRobin,
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" | "rand" => Ok(Self::Random),
            "round_robin" | "roundrobin" | "rr" => Ok(Self::RoundRobin),
            _ => Err(format!("Unknown selection strategy: {s}")),
        }
    }
}

impl SelectionStrategy {
    /// 从字符串解析选择策略
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// 转换为字符串
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_strategy_parsing() {
        assert_eq!(
            SelectionStrategy::parse("round_robin"),
            Some(SelectionStrategy::RoundRobin)
        );
        assert_eq!(SelectionStrategy::parse("RR"), Some(SelectionStrategy::RoundRobin));
        assert_eq!(
            SelectionStrategy::parse("random"),
            Some(SelectionStrategy::Random)
        );
        assert_eq!(SelectionStrategy::parse("weighted"), None);
        assert_eq!(SelectionStrategy::default(), SelectionStrategy::Random);
    }

    #[test]
    fn test_selection_strategy_serde() {
        let strategy: SelectionStrategy = serde_json::from_str(r#""round_robin""#).unwrap();
        assert_eq!(strategy, SelectionStrategy::RoundRobin);
        assert_eq!(
            serde_json::to_string(&SelectionStrategy::Random).unwrap(),
            r#""random""#
        );
    }

    #[test]
    fn test_api_key_debug_is_masked() {
        let key = ApiKey::new("AIzaSySecretValue", "GEMINI_API_KEY");
        let debug = format!("{key:?}");
        assert!(debug.contains("AIza..."));
        assert!(!debug.contains("SecretValue"));
        assert_eq!(key.masked(), "AIza...");
    }

    #[test]
    fn test_pool_dedup_keeps_first_source() {
        let pool = KeyPool::from_keys(vec![
            ApiKey::new("a", "GEMINI_API_KEY"),
            ApiKey::new("b", "GEMINI_KEY_1"),
            ApiKey::new("a", "GEMINI_KEY_2"),
        ]);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.keys()[0].source(), "GEMINI_API_KEY");
        assert_eq!(pool.sources(), vec!["GEMINI_API_KEY", "GEMINI_KEY_1"]);
        assert!(KeyPool::default().is_empty());
    }
}
