//! # 客户端错误类型

use thiserror::Error;

use crate::providers::{ErrorClass, ErrorClassifier};

/// 配额耗尽时展示给用户的提示
pub const QUOTA_EXCEEDED_MESSAGE: &str = "AI Quota Exceeded: You've reached the daily limit for the free version of Gemini. Please try again in a few hours or use a different API key with a paid project.";

/// 请求超时时展示给用户的提示
pub const TIMEOUT_MESSAGE: &str = "The AI took too long to respond (Timeout). Please try a simpler request or check your internet connection.";

/// 请求体校验失败时网关返回的错误码，不参与密钥错误判断
const INVALID_BODY_CODE: &str = "INVALID_REQUEST_BODY";

/// 服务端未配置任何密钥时网关返回的错误码
const NO_KEY_CODE: &str = "NO_KEY_CONFIGURED";

/// 错误响应体截断长度
const SNIPPET_LEN: usize = 100;

/// 网关客户端错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// 无法连接网关
    #[error("Could not reach the gateway: {0}")]
    Unreachable(String),

    /// 请求超时
    #[error("{}", TIMEOUT_MESSAGE)]
    Timeout,

    /// 响应体不是预期的 JSON（例如开发服务器启动期间返回的 HTML）
    #[error("Server returned invalid JSON response (HTTP {status}): {snippet}")]
    MalformedBody { status: u16, snippet: String },

    /// 成功响应但响应体为空
    #[error("Empty response from server.")]
    EmptyBody,

    /// 服务端没有配置任何密钥，需要运维介入
    #[error("No API key configured on the server: {message}")]
    NoKeyConfigured { status: u16, message: String },

    /// 配额耗尽
    #[error("{}", QUOTA_EXCEEDED_MESSAGE)]
    QuotaExceeded { message: String },

    /// 密钥无效
    #[error("Invalid API key: {message}")]
    InvalidKey { message: String },

    /// 其他网关错误
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// 模型输出无法解析为 JSON
    #[error("{0}")]
    AiOutput(&'static str),

    /// 密钥选择流程失败
    #[error("Key selection failed: {0}")]
    KeySelection(String),
}

impl ClientError {
    /// 构造格式错误，响应体只保留前一段
    #[must_use]
    pub fn malformed(status: u16, body: &str) -> Self {
        Self::MalformedBody {
            status,
            snippet: snippet(body),
        }
    }

    /// 由非 2xx 响应构造错误
    ///
    /// 错误信息依次取 `error`（字符串）、`error.message`、`message`，最后退回原始响应体。
    #[must_use]
    pub fn from_error_body(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
        let code = parsed
            .as_ref()
            .and_then(|v| v.get("code"))
            .and_then(|c| c.as_str())
            .map(ToString::to_string);
        let message = parsed
            .as_ref()
            .and_then(extract_message)
            .or_else(|| (!body.trim().is_empty()).then(|| snippet(body)))
            .unwrap_or_else(|| format!("Server returned {status}"));

        match code.as_deref() {
            Some(NO_KEY_CODE) => return Self::NoKeyConfigured { status, message },
            Some(INVALID_BODY_CODE) => {
                return Self::Api {
                    status,
                    code,
                    message,
                };
            }
            _ => {}
        }

        match ErrorClassifier::classify(Some(status), &message).0 {
            ErrorClass::QuotaExceeded => Self::QuotaExceeded { message },
            ErrorClass::InvalidKey => Self::InvalidKey { message },
            ErrorClass::ModelNotFound | ErrorClass::Other => Self::Api {
                status,
                code,
                message,
            },
        }
    }

    /// 整体重试可能成功的错误：网关 5xx、连接失败、响应体异常
    ///
    /// 未配置密钥不在其列，即使状态码是 500。
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::MalformedBody { .. } | Self::EmptyBody => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// 健康检查中的过渡状态：服务未就绪或返回了非 JSON 页面
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::MalformedBody { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

fn extract_message(value: &serde_json::Value) -> Option<String> {
    let error = value.get("error");
    error
        .and_then(|e| e.as_str())
        .or_else(|| error.and_then(|e| e.get("message")).and_then(|m| m.as_str()))
        .or_else(|| value.get("message").and_then(|m| m.as_str()))
        .filter(|m| !m.is_empty())
        .map(ToString::to_string)
}

fn snippet(body: &str) -> String {
    body.trim().chars().take(SNIPPET_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_body_message_precedence() {
        let err = ClientError::from_error_body(500, r#"{"error":"boom","message":"ignored"}"#);
        assert_eq!(err.to_string(), "boom");

        let err = ClientError::from_error_body(500, r#"{"error":{"message":"nested"}}"#);
        assert_eq!(err.to_string(), "nested");

        let err = ClientError::from_error_body(500, r#"{"message":"top level"}"#);
        assert_eq!(err.to_string(), "top level");

        let err = ClientError::from_error_body(502, "<html>Bad Gateway</html>");
        assert_eq!(err.to_string(), "<html>Bad Gateway</html>");

        let err = ClientError::from_error_body(503, "");
        assert_eq!(err.to_string(), "Server returned 503");
    }

    #[test]
    fn test_error_body_classification() {
        let quota = ClientError::from_error_body(
            429,
            r#"{"error":"All keys exhausted","code":"QUOTA_EXCEEDED"}"#,
        );
        assert!(matches!(quota, ClientError::QuotaExceeded { .. }));
        assert_eq!(quota.to_string(), QUOTA_EXCEEDED_MESSAGE);

        let quota = ClientError::from_error_body(500, r#"{"error":"RESOURCE_EXHAUSTED"}"#);
        assert!(matches!(quota, ClientError::QuotaExceeded { .. }));

        let invalid = ClientError::from_error_body(
            401,
            r#"{"error":"API key not valid","code":"API_KEY_INVALID"}"#,
        );
        assert!(matches!(invalid, ClientError::InvalidKey { .. }));

        let bad_body = ClientError::from_error_body(
            400,
            r#"{"error":"contents is required","code":"INVALID_REQUEST_BODY"}"#,
        );
        assert_eq!(
            bad_body,
            ClientError::Api {
                status: 400,
                code: Some("INVALID_REQUEST_BODY".to_string()),
                message: "contents is required".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_key_is_not_an_invalid_key() {
        let missing = ClientError::from_error_body(
            401,
            r#"{"error":"No API key found","code":"NO_KEY_CONFIGURED"}"#,
        );
        assert_eq!(
            missing,
            ClientError::NoKeyConfigured {
                status: 401,
                message: "No API key found".to_string(),
            }
        );

        let missing = ClientError::from_error_body(500, r#"{"code":"NO_KEY_CONFIGURED"}"#);
        assert!(matches!(missing, ClientError::NoKeyConfigured { status: 500, .. }));
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::Unreachable("refused".into()).is_retryable());
        assert!(ClientError::malformed(200, "<html>").is_retryable());
        assert!(ClientError::EmptyBody.is_retryable());
        assert!(ClientError::from_error_body(500, r#"{"error":"x"}"#).is_retryable());
        assert!(!ClientError::Timeout.is_retryable());
        assert!(!ClientError::from_error_body(404, r#"{"error":"nope"}"#).is_retryable());
        assert!(
            !ClientError::from_error_body(
                500,
                r#"{"error":"No API key configured","code":"NO_KEY_CONFIGURED"}"#
            )
            .is_retryable()
        );
        assert!(
            !ClientError::QuotaExceeded {
                message: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_malformed_snippet_is_truncated() {
        let body = "x".repeat(500);
        let ClientError::MalformedBody { status, snippet } = ClientError::malformed(200, &body)
        else {
            panic!("expected MalformedBody");
        };
        assert_eq!(status, 200);
        assert_eq!(snippet.len(), SNIPPET_LEN);
    }
}
