//! # 上游错误分类
//!
//! 按顺序匹配规则表，第一条命中的规则决定失败类型。
//! 规则与任何真实上游无关，可单独测试。

use super::types::{FailureKind, GenerationOutcome, UpstreamFailure};

/// 分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 配额耗尽
    QuotaExceeded,
    /// 密钥无效
    InvalidKey,
    /// 模型不存在
    ModelNotFound,
    /// 其他
    Other,
}

/// 单条分类规则
pub struct ClassificationRule {
    /// 规则名（日志用）
    pub name: &'static str,
    /// 匹配条件：上游状态码与错误信息
    pub predicate: fn(Option<u16>, &str) -> bool,
    /// 命中后的分类
    pub class: ErrorClass,
}

fn is_quota_status(status: Option<u16>, _message: &str) -> bool {
    status == Some(429)
}

fn mentions_quota(_status: Option<u16>, message: &str) -> bool {
    message.contains("RESOURCE_EXHAUSTED")
        || message.to_lowercase().contains("quota")
        || message.contains("429")
}

fn mentions_invalid_key(_status: Option<u16>, message: &str) -> bool {
    message.contains("API_KEY_INVALID")
        || message.contains("API key not valid")
        || message.contains("API key expired")
}

fn is_model_not_found(status: Option<u16>, message: &str) -> bool {
    message.contains("Requested entity was not found") || status == Some(404)
}

fn is_auth_status(status: Option<u16>, _message: &str) -> bool {
    matches!(status, Some(400 | 401))
}

/// 分类规则表（有序）
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        name: "status_429",
        predicate: is_quota_status,
        class: ErrorClass::QuotaExceeded,
    },
    ClassificationRule {
        name: "quota_message",
        predicate: mentions_quota,
        class: ErrorClass::QuotaExceeded,
    },
    ClassificationRule {
        name: "invalid_key_message",
        predicate: mentions_invalid_key,
        class: ErrorClass::InvalidKey,
    },
    ClassificationRule {
        name: "model_not_found",
        predicate: is_model_not_found,
        class: ErrorClass::ModelNotFound,
    },
    ClassificationRule {
        name: "status_400_401",
        predicate: is_auth_status,
        class: ErrorClass::InvalidKey,
    },
];

/// 上游错误分类器
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// 返回分类结果与命中的规则名
    #[must_use]
    pub fn classify(status: Option<u16>, message: &str) -> (ErrorClass, &'static str) {
        CLASSIFICATION_RULES
            .iter()
            .find(|rule| (rule.predicate)(status, message))
            .map_or((ErrorClass::Other, "fallback"), |rule| {
                (rule.class, rule.name)
            })
    }

    /// 将上游错误转换为单次尝试结果
    #[must_use]
    pub fn to_outcome(status: Option<u16>, message: String) -> GenerationOutcome {
        match Self::classify(status, &message).0 {
            ErrorClass::QuotaExceeded => GenerationOutcome::QuotaExceeded { message },
            ErrorClass::InvalidKey => GenerationOutcome::InvalidKey { message },
            ErrorClass::ModelNotFound => GenerationOutcome::OtherFailure(UpstreamFailure::new(
                FailureKind::ModelNotFound,
                status,
                message,
            )),
            ErrorClass::Other => GenerationOutcome::OtherFailure(UpstreamFailure::new(
                FailureKind::Upstream,
                status,
                message,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Some(429), "anything", ErrorClass::QuotaExceeded, "status_429")]
    #[case(Some(500), "RESOURCE_EXHAUSTED: try later", ErrorClass::QuotaExceeded, "quota_message")]
    #[case(Some(403), "Quota exceeded for metric", ErrorClass::QuotaExceeded, "quota_message")]
    #[case(None, "got 429 from upstream", ErrorClass::QuotaExceeded, "quota_message")]
    #[case(Some(400), "INVALID_ARGUMENT: API key not valid. Please pass a valid API key.", ErrorClass::InvalidKey, "invalid_key_message")]
    #[case(Some(403), "API_KEY_INVALID", ErrorClass::InvalidKey, "invalid_key_message")]
    #[case(Some(400), "API key expired. Please renew the API key.", ErrorClass::InvalidKey, "invalid_key_message")]
    #[case(Some(404), "models/foo is not found", ErrorClass::ModelNotFound, "model_not_found")]
    #[case(Some(500), "Requested entity was not found.", ErrorClass::ModelNotFound, "model_not_found")]
    #[case(Some(400), "Invalid JSON payload", ErrorClass::InvalidKey, "status_400_401")]
    #[case(Some(401), "UNAUTHENTICATED", ErrorClass::InvalidKey, "status_400_401")]
    #[case(Some(500), "INTERNAL: backend error", ErrorClass::Other, "fallback")]
    #[case(Some(503), "UNAVAILABLE: overloaded", ErrorClass::Other, "fallback")]
    #[case(None, "", ErrorClass::Other, "fallback")]
    fn test_classification_rules(
        #[case] status: Option<u16>,
        #[case] message: &str,
        #[case] expected: ErrorClass,
        #[case] rule: &str,
    ) {
        assert_eq!(ErrorClassifier::classify(status, message), (expected, rule));
    }

    #[test]
    fn test_quota_takes_precedence_over_invalid_key() {
        let (class, _) = ErrorClassifier::classify(Some(400), "API_KEY_INVALID quota");
        assert_eq!(class, ErrorClass::QuotaExceeded);
    }

    #[test]
    fn test_to_outcome() {
        assert!(matches!(
            ErrorClassifier::to_outcome(Some(429), "slow down".to_string()),
            GenerationOutcome::QuotaExceeded { .. }
        ));
        assert_eq!(
            ErrorClassifier::to_outcome(Some(404), "missing".to_string()),
            GenerationOutcome::OtherFailure(UpstreamFailure::new(
                FailureKind::ModelNotFound,
                Some(404),
                "missing"
            ))
        );
    }
}
