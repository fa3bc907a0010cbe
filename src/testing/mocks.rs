//! # 测试 Mock 对象
//!
//! 提供上游调用器的 Mock 实现与模拟 Gemini REST 服务

use async_trait::async_trait;
use mockall::mock;
use serde_json::{Value, json};

use crate::key_pool::ApiKey;
use crate::providers::{GenerationOutcome, GenerationRequest, UpstreamCaller};

/// Mock 上游调用器
mock! {
    pub Upstream {}

    #[async_trait]
    impl UpstreamCaller for Upstream {
        async fn invoke(
            &self,
            key: &ApiKey,
            request: &GenerationRequest,
            request_id: &str,
        ) -> GenerationOutcome;

        fn name(&self) -> &'static str;
    }
}

/// 模拟 Gemini REST 服务
pub struct MockGeminiServer {
    server: wiremock::MockServer,
}

impl MockGeminiServer {
    /// 启动 Mock 服务器
    pub async fn start() -> Self {
        let server = wiremock::MockServer::start().await;
        Self { server }
    }

    /// 获取服务器 URI
    #[must_use]
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// 指定密钥调用 `generateContent` 时返回的响应
    pub async fn mock_generate(&self, api_key: &str, status: u16, body: Value) {
        use wiremock::{Mock, ResponseTemplate, matchers};

        Mock::given(matchers::method("POST"))
            .and(matchers::path_regex(r"^/v1beta/models/[^/]+:generateContent$"))
            .and(matchers::header("x-goog-api-key", api_key))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// 返回指定文本的成功响应
    pub async fn mock_text(&self, api_key: &str, text: &str) {
        self.mock_generate(api_key, 200, candidate_body(text)).await;
    }

    /// 返回 Gemini 风格的错误
    pub async fn mock_error(&self, api_key: &str, code: u16, status: &str, message: &str) {
        self.mock_generate(
            api_key,
            code,
            json!({"error": {"code": code, "message": message, "status": status}}),
        )
        .await;
    }

    /// 已收到的请求
    pub async fn received_requests(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }
}

/// 单候选的成功响应体
#[must_use]
pub fn candidate_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2, "totalTokenCount": 5}
    })
}
