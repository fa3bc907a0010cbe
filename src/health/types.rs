//! # 健康检查类型定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 无密钥时的来源标记
pub const NO_SOURCE: &str = "none";

/// 密钥可用性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAvailability {
    /// 至少有一个密钥
    Ok,
    /// 没有配置密钥
    Missing,
}

impl fmt::Display for KeyAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

/// 健康检查响应
///
/// 只反映本地配置，不代表密钥在上游可用。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: KeyAvailability,
    /// 选中密钥的来源变量名，或 `none`
    #[serde(default = "default_source")]
    pub source: String,
    pub has_key: bool,
    #[serde(default)]
    pub key_count: usize,
}

fn default_source() -> String {
    NO_SOURCE.to_string()
}

impl HealthStatus {
    /// 无密钥
    #[must_use]
    pub fn missing() -> Self {
        Self {
            status: KeyAvailability::Missing,
            source: default_source(),
            has_key: false,
            key_count: 0,
        }
    }

    /// 有密钥
    pub fn available<S: Into<String>>(source: S, key_count: usize) -> Self {
        Self {
            status: KeyAvailability::Ok,
            source: source.into(),
            has_key: true,
            key_count,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == KeyAvailability::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let value = serde_json::to_value(HealthStatus::available("GEMINI_KEY_2", 3)).unwrap();
        assert_eq!(
            value,
            json!({"status": "ok", "source": "GEMINI_KEY_2", "hasKey": true, "keyCount": 3})
        );

        let value = serde_json::to_value(HealthStatus::missing()).unwrap();
        assert_eq!(
            value,
            json!({"status": "missing", "source": "none", "hasKey": false, "keyCount": 0})
        );
    }

    #[test]
    fn test_tolerant_deserialisation() {
        let status: HealthStatus =
            serde_json::from_value(json!({"status": "ok", "hasKey": true, "extra": 1})).unwrap();
        assert!(status.is_ok());
        assert_eq!(status.source, NO_SOURCE);
        assert_eq!(status.key_count, 0);
    }
}
