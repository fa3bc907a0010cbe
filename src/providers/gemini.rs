//! # Google Gemini REST 客户端
//!
//! 每次调用都为单个密钥新建客户端，客户端不在密钥之间复用。
//! 请求体按 `generateContent` 的 REST 格式规范化。

use super::classifier::ErrorClassifier;
use super::traits::UpstreamCaller;
use super::types::{
    FailureKind, GenerationOutcome, GenerationRequest, GenerationResponse, UpstreamFailure,
};
use crate::config::GeminiConfig;
use crate::key_pool::ApiKey;
use crate::{
    ldebug,
    logging::{LogComponent, LogStage},
    lwarn,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::time::Duration;

/// 放到请求顶层而不是 `generationConfig` 的配置项
const TOP_LEVEL_CONFIG_KEYS: &[&str] = &["tools", "toolConfig", "safetySettings", "cachedContent"];

/// 只对 SDK 有意义、不发送给 REST 接口的配置项
const CLIENT_ONLY_CONFIG_KEYS: &[&str] = &["httpOptions", "abortSignal"];

/// 错误片段最大长度
const SNIPPET_LEN: usize = 200;

/// 绑定单个密钥的 Gemini 客户端
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: ApiKey,
    base_url: String,
    api_version: String,
    timeout: Duration,
}

impl GeminiClient {
    /// 为指定密钥创建客户端
    pub fn new(api_key: ApiKey, config: &GeminiConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gemini-key-proxy/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            timeout: config.request_timeout(),
        })
    }

    /// `generateContent` 端点地址
    #[must_use]
    pub fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!(
            "{}/{}/models/{model}:generateContent",
            self.base_url, self.api_version
        )
    }

    /// 发送一次生成请求，整个调用受超时约束
    pub async fn generate_content(&self, model: &str, body: &Value) -> GenerationOutcome {
        match tokio::time::timeout(self.timeout, self.send(model, body)).await {
            Ok(outcome) => outcome,
            Err(_) => GenerationOutcome::OtherFailure(UpstreamFailure::new(
                FailureKind::Timeout,
                None,
                format!(
                    "Gemini request timed out after {}s",
                    self.timeout.as_secs_f32()
                ),
            )),
        }
    }

    async fn send(&self, model: &str, body: &Value) -> GenerationOutcome {
        let response = match self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", self.api_key.value())
            .json(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return transport_failure(&e),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return transport_failure(&e),
        };

        if !status.is_success() {
            let message = extract_error_message(&text).unwrap_or_else(|| {
                if text.trim().is_empty() {
                    status.canonical_reason().unwrap_or("Unknown error").to_string()
                } else {
                    snippet(&text)
                }
            });
            return ErrorClassifier::to_outcome(Some(status.as_u16()), message);
        }

        let parsed = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(GenerationResponse::from_payload);

        parsed.map_or_else(
            || {
                GenerationOutcome::OtherFailure(UpstreamFailure::new(
                    FailureKind::MalformedResponse,
                    Some(status.as_u16()),
                    format!("Malformed response from Gemini: {}", snippet(&text)),
                ))
            },
            GenerationOutcome::Success,
        )
    }
}

fn transport_failure(error: &reqwest::Error) -> GenerationOutcome {
    let kind = if error.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Transport
    };
    GenerationOutcome::OtherFailure(UpstreamFailure::new(
        kind,
        error.status().map(|s| s.as_u16()),
        format!("Gemini request failed: {error}"),
    ))
}

/// 解析 `{"error": {"code", "message", "status"}}`，组合成 `STATUS: message`
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;

    let message = error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())?;

    Some(match error.get("status").and_then(Value::as_str) {
        Some(status) => format!("{status}: {message}"),
        None => message.to_string(),
    })
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > SNIPPET_LEN {
        let head: String = trimmed.chars().take(SNIPPET_LEN).collect();
        format!("{head}...")
    } else {
        trimmed.to_string()
    }
}

/// 将网关请求规范化为 `generateContent` 的请求体
#[must_use]
pub fn build_request_body(request: &GenerationRequest) -> Value {
    let mut body = Map::new();
    body.insert("contents".to_string(), normalize_contents(&request.contents));

    if let Some(Value::Object(config)) = &request.config {
        let mut generation_config = Map::new();

        for (key, value) in config {
            if CLIENT_ONLY_CONFIG_KEYS.contains(&key.as_str()) || value.is_null() {
                continue;
            }
            if key == "systemInstruction" {
                body.insert(key.clone(), normalize_system_instruction(value));
            } else if TOP_LEVEL_CONFIG_KEYS.contains(&key.as_str()) {
                body.insert(key.clone(), value.clone());
            } else {
                generation_config.insert(key.clone(), value.clone());
            }
        }

        if !generation_config.is_empty() {
            body.insert(
                "generationConfig".to_string(),
                Value::Object(generation_config),
            );
        }
    }

    Value::Object(body)
}

fn is_content(value: &Value) -> bool {
    value.get("parts").is_some() || value.get("role").is_some()
}

fn to_part(value: &Value) -> Value {
    match value {
        Value::String(text) => json!({ "text": text }),
        other => other.clone(),
    }
}

fn normalize_contents(contents: &Value) -> Value {
    match contents {
        Value::String(text) => json!([{ "role": "user", "parts": [{ "text": text }] }]),
        Value::Object(_) if is_content(contents) => json!([contents]),
        Value::Object(_) => json!([{ "role": "user", "parts": [contents] }]),
        Value::Array(items) if items.iter().all(is_content) => contents.clone(),
        Value::Array(items) => {
            let parts: Vec<Value> = items.iter().map(to_part).collect();
            json!([{ "role": "user", "parts": parts }])
        }
        other => other.clone(),
    }
}

fn normalize_system_instruction(value: &Value) -> Value {
    match value {
        Value::String(text) => json!({ "parts": [{ "text": text }] }),
        Value::Array(items) => {
            let parts: Vec<Value> = items.iter().map(to_part).collect();
            json!({ "parts": parts })
        }
        Value::Object(_) if is_content(value) => value.clone(),
        other => json!({ "parts": [other] }),
    }
}

/// 基于 Gemini REST 接口的上游调用器
#[derive(Debug, Clone)]
pub struct GeminiUpstream {
    config: GeminiConfig,
}

impl GeminiUpstream {
    #[must_use]
    pub const fn new(config: GeminiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl UpstreamCaller for GeminiUpstream {
    async fn invoke(
        &self,
        key: &ApiKey,
        request: &GenerationRequest,
        request_id: &str,
    ) -> GenerationOutcome {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);
        let body = build_request_body(request);

        let client = match GeminiClient::new(key.clone(), &self.config) {
            Ok(client) => client,
            Err(e) => {
                lwarn!(
                    request_id,
                    LogStage::UpstreamRequest,
                    LogComponent::Upstream,
                    "client_build_failed",
                    "Failed to build Gemini client",
                    error = %e
                );
                return transport_failure(&e);
            }
        };

        ldebug!(
            request_id,
            LogStage::UpstreamRequest,
            LogComponent::Upstream,
            "generate_content",
            "Sending generateContent request",
            model = model,
            source = key.source(),
            key = %key.masked()
        );

        let outcome = client.generate_content(model, &body).await;

        ldebug!(
            request_id,
            LogStage::UpstreamRequest,
            LogComponent::Upstream,
            "generate_content_done",
            "Gemini call finished",
            outcome = outcome.label(),
            source = key.source()
        );

        outcome
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockGeminiServer, gemini_config_for, init_test_env};
    use pretty_assertions::assert_eq;

    fn request(contents: Value, config: Option<Value>) -> GenerationRequest {
        GenerationRequest {
            model: None,
            contents,
            config,
        }
    }

    #[test]
    fn test_string_contents_become_user_turn() {
        let body = build_request_body(&request(json!("hello"), None));
        assert_eq!(
            body,
            json!({"contents": [{"role": "user", "parts": [{"text": "hello"}]}]})
        );
    }

    #[test]
    fn test_content_shapes() {
        let single = json!({"role": "user", "parts": [{"text": "a"}]});
        assert_eq!(normalize_contents(&single), json!([single]));

        let turns = json!([
            {"role": "user", "parts": [{"text": "a"}]},
            {"role": "model", "parts": [{"text": "b"}]}
        ]);
        assert_eq!(normalize_contents(&turns), turns);

        let mixed = json!(["describe", {"inlineData": {"mimeType": "image/png", "data": "AA=="}}]);
        assert_eq!(
            normalize_contents(&mixed),
            json!([{"role": "user", "parts": [
                {"text": "describe"},
                {"inlineData": {"mimeType": "image/png", "data": "AA=="}}
            ]}])
        );
    }

    #[test]
    fn test_config_is_split() {
        let body = build_request_body(&request(
            json!("hi"),
            Some(json!({
                "systemInstruction": "be brief",
                "temperature": 0.3,
                "responseMimeType": "application/json",
                "tools": [{"googleSearch": {}}],
                "httpOptions": {"timeout": 10}
            })),
        ));

        assert_eq!(body["systemInstruction"], json!({"parts": [{"text": "be brief"}]}));
        assert_eq!(body["tools"], json!([{"googleSearch": {}}]));
        assert_eq!(
            body["generationConfig"],
            json!({"temperature": 0.3, "responseMimeType": "application/json"})
        );
        assert!(body.get("httpOptions").is_none());
    }

    #[test]
    fn test_extract_error_message() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("RESOURCE_EXHAUSTED: Quota exceeded")
        );
        assert_eq!(extract_error_message("<html>oops</html>"), None);
    }

    #[tokio::test]
    async fn test_generate_content_success_sets_text() {
        init_test_env();
        let server = MockGeminiServer::start().await;
        server.mock_text("key-a", "Stretch first").await;

        let config = gemini_config_for(&server.uri(), 5);
        let client = GeminiClient::new(ApiKey::new("key-a", "GEMINI_API_KEY"), &config).unwrap();
        let outcome = client
            .generate_content("gemini-2.5-flash", &json!({"contents": []}))
            .await;

        let GenerationOutcome::Success(response) = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        assert_eq!(response.text(), "Stretch first");
        assert_eq!(response.payload()["usageMetadata"]["totalTokenCount"], 5);
    }

    #[tokio::test]
    async fn test_generate_content_classifies_errors() {
        init_test_env();
        let server = MockGeminiServer::start().await;
        server
            .mock_error("quota", 429, "RESOURCE_EXHAUSTED", "Quota exceeded")
            .await;
        server
            .mock_error("bad", 400, "INVALID_ARGUMENT", "API key not valid. Please pass a valid API key.")
            .await;
        server
            .mock_error("missing-model", 404, "NOT_FOUND", "models/nope is not found")
            .await;
        let config = gemini_config_for(&server.uri(), 5);

        let call = |key: &'static str| {
            let config = config.clone();
            async move {
                GeminiClient::new(ApiKey::new(key, "GEMINI_API_KEY"), &config)
                    .unwrap()
                    .generate_content("gemini-2.5-flash", &json!({"contents": []}))
                    .await
            }
        };

        assert_eq!(
            call("quota").await,
            GenerationOutcome::QuotaExceeded {
                message: "RESOURCE_EXHAUSTED: Quota exceeded".to_string()
            }
        );
        assert!(matches!(call("bad").await, GenerationOutcome::InvalidKey { .. }));
        assert!(matches!(
            call("missing-model").await,
            GenerationOutcome::OtherFailure(UpstreamFailure {
                kind: FailureKind::ModelNotFound,
                status: Some(404),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_upstream_binds_each_call_to_its_key() {
        let server = MockGeminiServer::start().await;
        server.mock_text("first", "one").await;
        server.mock_text("second", "two").await;

        let upstream = GeminiUpstream::new(gemini_config_for(&server.uri(), 5));
        let request = GenerationRequest::from_prompt("gemini-2.5-flash", "hi");
        let first = upstream
            .invoke(&ApiKey::new("first", "GEMINI_KEY_1"), &request, "t")
            .await;
        let second = upstream
            .invoke(&ApiKey::new("second", "GEMINI_KEY_2"), &request, "t")
            .await;
        assert!(matches!(first, GenerationOutcome::Success(ref r) if r.text() == "one"));
        assert!(matches!(second, GenerationOutcome::Success(ref r) if r.text() == "two"));

        let keys: Vec<String> = server
            .received_requests()
            .await
            .iter()
            .filter_map(|r| r.headers.get("x-goog-api-key"))
            .filter_map(|v| v.to_str().ok().map(ToString::to_string))
            .collect();
        assert_eq!(keys, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_endpoint_strips_models_prefix() {
        let config = GeminiConfig {
            base_url: "http://localhost:9999/".to_string(),
            ..GeminiConfig::default()
        };
        let client = GeminiClient::new(ApiKey::new("k", "GEMINI_API_KEY"), &config).unwrap();
        assert_eq!(
            client.endpoint("models/gemini-2.5-flash"),
            "http://localhost:9999/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
