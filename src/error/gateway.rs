//! # 网关错误
//!
//! 故障转移网关对外只暴露三类错误：未配置密钥、所有密钥均因密钥相关原因失败、
//! 以及与密钥无关的上游失败。单个密钥的失败在网关内部被吸收。

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::FailureKind;

/// 与具体密钥相关的失败类型（可通过切换密钥恢复）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFailureKind {
    /// 配额耗尽
    QuotaExceeded,
    /// 密钥无效或未授权
    InvalidKey,
}

impl KeyFailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota_exceeded",
            Self::InvalidKey => "invalid_key",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(
        "Gemini API key not configured on server. Please set GEMINI_API_KEY or GEMINI_KEY_1..N"
    )]
    NoKeyConfigured,

    #[error("{}", exhausted_message(*.kind, .message, *.attempts))]
    KeysExhausted {
        kind: KeyFailureKind,
        message: String,
        attempts: usize,
    },

    #[error("{}", upstream_message(*.kind, .message))]
    Upstream {
        kind: FailureKind,
        status: Option<u16>,
        message: String,
    },
}

fn exhausted_message(kind: KeyFailureKind, message: &str, attempts: usize) -> String {
    match kind {
        KeyFailureKind::QuotaExceeded => format!(
            "AI quota exceeded on all {attempts} configured key(s). Please try again later or add a key from a paid project. Last error: {message}"
        ),
        KeyFailureKind::InvalidKey => format!(
            "The API key is invalid or unauthorized ({attempts} key(s) tried). Please check your Google Cloud project billing and API restrictions. Last error: {message}"
        ),
    }
}

fn upstream_message(kind: FailureKind, message: &str) -> String {
    match kind {
        FailureKind::ModelNotFound => "The requested model or resource was not found. This might be a region restriction or invalid model name.".to_string(),
        FailureKind::Timeout => "The AI service did not respond in time. Please try again.".to_string(),
        FailureKind::MalformedResponse => "The AI service returned a response that could not be read.".to_string(),
        FailureKind::Transport => format!("Could not reach the AI service: {message}"),
        FailureKind::Upstream if message.is_empty() => {
            "Internal Server Error during AI generation".to_string()
        }
        FailureKind::Upstream => message.to_string(),
    }
}

impl GatewayError {
    /// 创建上游错误
    pub fn upstream<T: Into<String>>(kind: FailureKind, status: Option<u16>, message: T) -> Self {
        Self::Upstream {
            kind,
            status,
            message: message.into(),
        }
    }

    /// 映射为 HTTP 状态码
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NoKeyConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            Self::KeysExhausted { kind, .. } => match kind {
                KeyFailureKind::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
                KeyFailureKind::InvalidKey => StatusCode::UNAUTHORIZED,
            },
            Self::Upstream { kind, .. } => match kind {
                FailureKind::ModelNotFound => StatusCode::NOT_FOUND,
                FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                FailureKind::MalformedResponse => StatusCode::BAD_GATEWAY,
                FailureKind::Transport | FailureKind::Upstream => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// 机器可读的错误码
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoKeyConfigured => "NO_KEY_CONFIGURED",
            Self::KeysExhausted { kind, .. } => match kind {
                KeyFailureKind::QuotaExceeded => "QUOTA_EXCEEDED",
                KeyFailureKind::InvalidKey => "API_KEY_INVALID",
            },
            Self::Upstream { kind, .. } => match kind {
                FailureKind::ModelNotFound => "MODEL_NOT_FOUND",
                FailureKind::Timeout => "UPSTREAM_TIMEOUT",
                FailureKind::MalformedResponse => "MALFORMED_UPSTREAM_RESPONSE",
                FailureKind::Transport => "UPSTREAM_UNREACHABLE",
                FailureKind::Upstream => "AI_GEN_ERROR",
            },
        }
    }

    /// 原始上游错误信息（用于响应中的 detail 字段）
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::NoKeyConfigured => None,
            Self::KeysExhausted { message, .. } | Self::Upstream { message, .. } => {
                Some(message.as_str())
            }
        }
    }

    /// 最终失败是否由密钥问题导致
    #[must_use]
    pub const fn is_key_related(&self) -> bool {
        matches!(self, Self::NoKeyConfigured | Self::KeysExhausted { .. })
    }
}
