//! # 上游调用类型定义

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 生成请求
///
/// `contents` 与 `config` 对网关不透明，原样交给每一次密钥尝试。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// 模型名，缺省时使用配置中的默认模型
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// 对话内容
    pub contents: Value,
    /// 生成配置
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl GenerationRequest {
    /// 单轮纯文本请求
    pub fn from_prompt<M: Into<String>, P: Into<String>>(model: M, prompt: P) -> Self {
        Self {
            model: Some(model.into()),
            contents: Value::String(prompt.into()),
            config: None,
        }
    }

    /// 校验请求形状
    pub fn validate(&self) -> Result<(), String> {
        match &self.contents {
            Value::String(text) if text.trim().is_empty() => {
                Err("contents must not be empty".to_string())
            }
            Value::Array(items) if items.is_empty() => {
                Err("contents must not be an empty array".to_string())
            }
            Value::String(_) | Value::Object(_) | Value::Array(_) => Ok(()),
            _ => Err("contents must be a string, a content object or an array".to_string()),
        }?;

        if let Some(config) = &self.config
            && !(config.is_object() || config.is_null())
        {
            return Err("config must be an object".to_string());
        }

        if let Some(model) = &self.model
            && model.trim().is_empty()
        {
            return Err("model must not be empty".to_string());
        }

        Ok(())
    }
}

/// 生成响应
///
/// 保留上游返回的完整 JSON 对象，并保证 `text` 字段总是存在。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationResponse {
    payload: Map<String, Value>,
}

impl GenerationResponse {
    /// 从上游 JSON 构建，非对象返回 `None`
    #[must_use]
    pub fn from_payload(payload: Value) -> Option<Self> {
        let Value::Object(mut payload) = payload else {
            return None;
        };
        let text = extract_candidate_text(&payload);
        payload.insert("text".to_string(), Value::String(text));
        Some(Self { payload })
    }

    /// 首个候选的文本
    #[must_use]
    pub fn text(&self) -> &str {
        self.payload
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    #[must_use]
    pub const fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.payload)
    }
}

/// 拼接首个候选中所有非思考部分的文本
fn extract_candidate_text(payload: &Map<String, Value>) -> String {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.pointer("/content/parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// 非密钥类失败的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 模型不存在
    ModelNotFound,
    /// 上游调用超时
    Timeout,
    /// 上游响应无法解析
    MalformedResponse,
    /// 网络层失败（连接、TLS 等）
    Transport,
    /// 其他上游错误
    Upstream,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModelNotFound => "model_not_found",
            Self::Timeout => "timeout",
            Self::MalformedResponse => "malformed_response",
            Self::Transport => "transport",
            Self::Upstream => "upstream",
        }
    }
}

/// 非密钥类的上游失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailure {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl UpstreamFailure {
    pub fn new<T: Into<String>>(kind: FailureKind, status: Option<u16>, message: T) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
        }
    }
}

/// 单次密钥尝试的结果
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// 成功
    Success(GenerationResponse),
    /// 该密钥配额耗尽
    QuotaExceeded { message: String },
    /// 该密钥无效或未授权
    InvalidKey { message: String },
    /// 与密钥无关的失败，换密钥无意义
    OtherFailure(UpstreamFailure),
}

impl GenerationOutcome {
    /// 日志用的结果名
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::InvalidKey { .. } => "invalid_key",
            Self::OtherFailure(_) => "other_failure",
        }
    }

    /// 是否值得换下一个密钥重试
    #[must_use]
    pub const fn is_key_specific(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::InvalidKey { .. })
    }
}
